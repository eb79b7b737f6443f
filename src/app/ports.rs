use crate::domain::BatchReceipt;
use async_trait::async_trait;
use std::fmt;

/// Pipeline layers as they are named in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArchivedSnapshot {
    pub partition: String,
    pub version: u64,
    pub payload: Vec<u8>,
}

/// Where committed snapshots and batch receipts are made durable.
#[async_trait]
pub trait SnapshotSinkPort: Send + Sync {
    async fn persist(&self, layer: Layer, partition: &str, version: u64, payload: Vec<u8>) -> anyhow::Result<()>;
    async fn load_latest(&self, layer: Layer) -> anyhow::Result<Vec<ArchivedSnapshot>>;
    async fn record_batch(&self, receipt: &BatchReceipt) -> anyhow::Result<()>;
    async fn find_batch(&self, content_hash: &str) -> anyhow::Result<Option<BatchReceipt>>;
}
