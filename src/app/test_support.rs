use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::app::ports::{ArchivedSnapshot, Layer, SnapshotSinkPort};
use crate::domain::BatchReceipt;

/// In-memory sink whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakySink {
    failing: AtomicBool,
    writes: Mutex<Vec<(Layer, String, u64, Vec<u8>)>>,
    batches: Mutex<BTreeMap<String, BatchReceipt>>,
}

impl FlakySink {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn persisted(&self, layer: Layer) -> Vec<(String, u64)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, ..)| *l == layer)
            .map(|(_, partition, version, _)| (partition.clone(), *version))
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("archive unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSinkPort for FlakySink {
    async fn persist(&self, layer: Layer, partition: &str, version: u64, payload: Vec<u8>) -> anyhow::Result<()> {
        self.check()?;
        self.writes
            .lock()
            .unwrap()
            .push((layer, partition.to_string(), version, payload));
        Ok(())
    }

    async fn load_latest(&self, layer: Layer) -> anyhow::Result<Vec<ArchivedSnapshot>> {
        let mut latest: BTreeMap<String, ArchivedSnapshot> = BTreeMap::new();
        for (l, partition, version, payload) in self.writes.lock().unwrap().iter() {
            if *l != layer || latest.get(partition).is_some_and(|s| s.version >= *version) {
                continue;
            }
            latest.insert(
                partition.clone(),
                ArchivedSnapshot {
                    partition: partition.clone(),
                    version: *version,
                    payload: payload.clone(),
                },
            );
        }
        Ok(latest.into_values().collect())
    }

    async fn record_batch(&self, receipt: &BatchReceipt) -> anyhow::Result<()> {
        self.check()?;
        self.batches
            .lock()
            .unwrap()
            .entry(receipt.content_hash.clone())
            .or_insert_with(|| receipt.clone());
        Ok(())
    }

    async fn find_batch(&self, content_hash: &str) -> anyhow::Result<Option<BatchReceipt>> {
        Ok(self.batches.lock().unwrap().get(content_hash).cloned())
    }
}
