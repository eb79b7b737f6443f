use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::ingest_use_case::{IngestReport, IngestUseCase};
use crate::app::ports::{Layer, SnapshotSinkPort};
use crate::app::publisher::SnapshotPublisher;
use crate::app::transform_use_case::{TransformReport, TransformUseCase};
use crate::config::PulseConfig;
use crate::domain::SchemaType;
use crate::infra::archive_sink_adapter::ArchiveSinkAdapter;
use crate::pipeline::processing::gold::{GoldStore, GoldTable};
use crate::pipeline::processing::silver::{SilverStore, SilverTable};
use crate::pipeline::storage::{BronzeStats, BronzeTable, RawStore};
use crate::query::MetricsStore;

/// Wires the three layers, the use cases and the optional archive together.
pub struct PulseService {
    raw_store: Arc<RawStore>,
    ingest: IngestUseCase,
    transform: TransformUseCase,
    metrics_store: MetricsStore,
}

impl PulseService {
    /// Build a service, backed by the archive under `storage.data_dir` when one is configured.
    pub async fn open(config: &PulseConfig) -> Result<Self> {
        let sink: Option<Arc<dyn SnapshotSinkPort>> = match &config.storage.data_dir {
            Some(dir) => Some(Arc::new(ArchiveSinkAdapter::open(dir)?)),
            None => None,
        };
        Self::with_sink(config, sink).await
    }

    pub async fn with_sink(config: &PulseConfig, sink: Option<Arc<dyn SnapshotSinkPort>>) -> Result<Self> {
        let retries = config.storage.max_commit_retries;
        let raw_store = Arc::new(RawStore::new(retries));
        let silver = Arc::new(SilverStore::new("silver", retries));
        let gold = Arc::new(GoldStore::new("gold", retries));

        let publisher = Arc::new(SnapshotPublisher::new(sink.clone()));
        if let Some(sink) = &sink {
            restore(sink.as_ref(), &publisher, &raw_store, &silver, &gold).await?;
        }

        Ok(Self {
            ingest: IngestUseCase::new(
                raw_store.clone(),
                publisher.clone(),
                config.ingest.max_reported_rejections,
            ),
            transform: TransformUseCase::new(raw_store.clone(), silver, gold.clone(), config, publisher),
            metrics_store: MetricsStore::new(gold),
            raw_store,
        })
    }

    pub async fn ingest_bytes(&self, bytes: &[u8], source_name: &str) -> Result<IngestReport> {
        self.ingest.ingest(bytes, source_name).await
    }

    pub async fn ingest_file<P: AsRef<Path>>(&self, path: P) -> Result<IngestReport> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest.ingest(&bytes, &source_name).await
    }

    pub async fn transform(&self, schema: Option<SchemaType>) -> Result<TransformReport> {
        self.transform.transform(schema).await
    }

    pub fn metrics(&self) -> &MetricsStore {
        &self.metrics_store
    }

    pub fn bronze_stats(&self) -> BTreeMap<SchemaType, BronzeStats> {
        self.raw_store.stats()
    }
}

/// Reload the newest archived snapshot of every partition into the in-memory stores.
async fn restore(
    sink: &dyn SnapshotSinkPort,
    publisher: &SnapshotPublisher,
    raw_store: &RawStore,
    silver: &SilverStore,
    gold: &GoldStore,
) -> Result<()> {
    let mut restored = 0usize;

    for archived in sink.load_latest(Layer::Bronze).await? {
        let Ok(schema) = SchemaType::from_str(&archived.partition) else {
            warn!(partition = %archived.partition, "Skipping archived bronze partition with unknown schema");
            continue;
        };
        let table: BronzeTable = serde_json::from_slice(&archived.payload)?;
        publisher.mark_archived(Layer::Bronze, &archived.partition, archived.version);
        if raw_store.restore(schema, archived.version, table) {
            restored += 1;
        }
    }

    for archived in sink.load_latest(Layer::Silver).await? {
        let Ok(schema) = SchemaType::from_str(&archived.partition) else {
            warn!(partition = %archived.partition, "Skipping archived silver partition with unknown schema");
            continue;
        };
        let table: SilverTable = serde_json::from_slice(&archived.payload)?;
        publisher.mark_archived(Layer::Silver, &archived.partition, archived.version);
        if silver.restore(schema, archived.version, table) {
            restored += 1;
        }
    }

    for archived in sink.load_latest(Layer::Gold).await? {
        let table: GoldTable = serde_json::from_slice(&archived.payload)?;
        publisher.mark_archived(Layer::Gold, &archived.partition, archived.version);
        let Some(window) = table.window else {
            continue;
        };
        if gold.restore(window, archived.version, table) {
            restored += 1;
        }
    }

    if restored > 0 {
        info!(partitions = restored, "Restored snapshots from archive");
    }
    Ok(())
}
