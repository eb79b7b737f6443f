use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::app::ports::{Layer, SnapshotSinkPort};

/// Tracks which snapshot versions have reached the sink.
///
/// In-memory commits happen before archiving, so a failed `persist` leaves a committed
/// version the archive has not seen. Every later publish call compares the partition's
/// current version with its archived watermark and writes whatever is behind.
pub struct SnapshotPublisher {
    sink: Option<Arc<dyn SnapshotSinkPort>>,
    archived: Mutex<HashMap<(Layer, String), u64>>,
}

impl SnapshotPublisher {
    pub fn new(sink: Option<Arc<dyn SnapshotSinkPort>>) -> Self {
        Self {
            sink,
            archived: Mutex::new(HashMap::new()),
        }
    }

    pub fn sink(&self) -> Option<&Arc<dyn SnapshotSinkPort>> {
        self.sink.as_ref()
    }

    /// Highest version known to be in the sink for a partition; 0 when none is.
    pub fn archived_version(&self, layer: Layer, partition: &str) -> u64 {
        self.archived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(layer, partition.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Record a version as already durable, e.g. one just reloaded from the sink.
    pub fn mark_archived(&self, layer: Layer, partition: &str, version: u64) {
        let mut archived = self.archived.lock().unwrap_or_else(|e| e.into_inner());
        let entry = archived.entry((layer, partition.to_string())).or_insert(0);
        *entry = (*entry).max(version);
    }

    /// Persist `version` unless the sink already holds it or something newer.
    ///
    /// `payload` is only built when a write is needed. Returns whether a write happened.
    pub async fn publish<F>(&self, layer: Layer, partition: &str, version: u64, payload: F) -> Result<bool>
    where
        F: FnOnce() -> serde_json::Result<Vec<u8>>,
    {
        let Some(sink) = &self.sink else {
            return Ok(false);
        };
        if version == 0 || version <= self.archived_version(layer, partition) {
            return Ok(false);
        }

        let bytes = payload()?;
        if let Err(e) = sink.persist(layer, partition, version, bytes).await {
            warn!(layer = %layer, partition, version, "Archive write failed, will retry on next publish: {:#}", e);
            return Err(e);
        }
        self.mark_archived(layer, partition, version);
        debug!(layer = %layer, partition, version, "Snapshot archived");
        Ok(true)
    }
}
