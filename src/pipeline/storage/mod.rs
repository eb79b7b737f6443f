// Versioned layer storage: the snapshot table every layer is built on, and Bronze itself

pub mod bronze;
pub mod snapshot;

pub use bronze::{AppendOutcome, BronzeBatch, BronzeStats, BronzeTable, RawStore};
pub use snapshot::{Snapshot, SnapshotTable, Updated};
