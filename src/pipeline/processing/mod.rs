// Layer transforms: Bronze -> Silver -> Gold, and the maturity classifier that annotates Gold

pub mod gold;
pub mod maturity;
pub mod silver;

pub use gold::{GoldAggregator, GoldRunResult, GoldStore, GoldTable, SilverChanges};
pub use maturity::MaturityClassifier;
pub use silver::{SilverRunResult, SilverStore, SilverTable, SilverTransformer};
