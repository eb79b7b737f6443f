use crate::app::ports::{ArchivedSnapshot, Layer, SnapshotSinkPort};
use crate::domain::BatchReceipt;
use crate::infra::snapshot_archive::SnapshotArchive;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// SnapshotSinkPort backed by the on-disk snapshot archive.
pub struct ArchiveSinkAdapter {
    archive: SnapshotArchive,
}

impl ArchiveSinkAdapter {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        info!("Opening snapshot archive at {}", data_dir.as_ref().display());
        Ok(Self {
            archive: SnapshotArchive::open_at_root(data_dir)?,
        })
    }
}

#[async_trait]
impl SnapshotSinkPort for ArchiveSinkAdapter {
    async fn persist(&self, layer: Layer, partition: &str, version: u64, payload: Vec<u8>) -> anyhow::Result<()> {
        self.archive
            .record_version(layer.as_str(), partition, version, &payload)?;
        Ok(())
    }

    async fn load_latest(&self, layer: Layer) -> anyhow::Result<Vec<ArchivedSnapshot>> {
        let mut out = Vec::new();
        for v in self.archive.latest_versions(layer.as_str())? {
            out.push(ArchivedSnapshot {
                payload: self.archive.read_payload(&v.payload_ref)?,
                partition: v.partition,
                version: v.version,
            });
        }
        Ok(out)
    }

    async fn record_batch(&self, receipt: &BatchReceipt) -> anyhow::Result<()> {
        self.archive.put_batch(receipt)
    }

    async fn find_batch(&self, content_hash: &str) -> anyhow::Result<Option<BatchReceipt>> {
        self.archive.get_batch(content_hash)
    }
}
