use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::ports::Layer;
use crate::app::publisher::SnapshotPublisher;
use crate::domain::{BatchReceipt, Rejection, SchemaType};
use crate::gateway::SchemaGatekeeper;
use crate::idempotency;
use crate::pipeline::storage::{AppendOutcome, BronzeBatch, RawStore};

/// What the ingestion trigger hands back for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub batch_id: Uuid,
    pub schema_type: SchemaType,
    pub source_name: String,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    pub rejections: Vec<Rejection>,
    /// The per-row list was capped; the counts above are always exact
    pub rejections_truncated: bool,
    /// The file had been ingested before and nothing was written
    pub duplicate: bool,
    pub bronze_version: u64,
}

impl IngestReport {
    fn duplicate_of(receipt: &BatchReceipt) -> Self {
        Self {
            batch_id: receipt.batch_id,
            schema_type: receipt.schema_type,
            source_name: receipt.source_name.clone(),
            accepted_rows: receipt.accepted_rows,
            rejected_rows: receipt.rejected_rows,
            rejections: Vec::new(),
            rejections_truncated: false,
            duplicate: true,
            bronze_version: receipt.bronze_version,
        }
    }
}

/// Use case for the ingestion trigger: Gatekeeper classify + validate, then Bronze append
pub struct IngestUseCase {
    raw_store: Arc<RawStore>,
    publisher: Arc<SnapshotPublisher>,
    max_reported_rejections: usize,
}

impl IngestUseCase {
    pub fn new(
        raw_store: Arc<RawStore>,
        publisher: Arc<SnapshotPublisher>,
        max_reported_rejections: usize,
    ) -> Self {
        Self {
            raw_store,
            publisher,
            max_reported_rejections,
        }
    }

    pub async fn ingest(&self, bytes: &[u8], source_name: &str) -> Result<IngestReport> {
        let content_hash = idempotency::content_hash(bytes);
        if let Some(receipt) = self.raw_store.find_receipt(&content_hash) {
            info!(batch_id = %receipt.batch_id, source = %source_name, "Skipping already ingested file");
            // An earlier attempt may have committed in memory but failed to archive
            self.archive(&receipt).await?;
            return Ok(IngestReport::duplicate_of(&receipt));
        }
        if let Some(receipt) = self.archived_batch(&content_hash).await? {
            info!(batch_id = %receipt.batch_id, source = %source_name, "Skipping file found in the archive");
            return Ok(IngestReport::duplicate_of(&receipt));
        }

        // File-level failures (unrecognized header, unreadable CSV) abort here
        let screened = SchemaGatekeeper::screen(bytes, source_name)?;
        let batch = BronzeBatch::from_screened(&screened, source_name, Utc::now());

        let receipt = match self.raw_store.append(&batch)? {
            AppendOutcome::Duplicate(receipt) => {
                self.archive(&receipt).await?;
                return Ok(IngestReport::duplicate_of(&receipt));
            }
            AppendOutcome::Appended(receipt) => receipt,
        };
        self.archive(&receipt).await?;

        let mut rejections = screened.rejections;
        let rejections_truncated = rejections.len() > self.max_reported_rejections;
        rejections.truncate(self.max_reported_rejections);

        Ok(IngestReport {
            batch_id: receipt.batch_id,
            schema_type: receipt.schema_type,
            source_name: receipt.source_name,
            accepted_rows: receipt.accepted_rows,
            rejected_rows: receipt.rejected_rows,
            rejections,
            rejections_truncated,
            duplicate: false,
            bronze_version: receipt.bronze_version,
        })
    }

    /// Make the Bronze snapshot holding `receipt` durable, then index the batch.
    ///
    /// The snapshot goes first so an indexed batch is always recoverable. Both steps are
    /// idempotent, so a retry after a failure finishes whatever is missing.
    async fn archive(&self, receipt: &BatchReceipt) -> Result<()> {
        let Some(sink) = self.publisher.sink() else {
            return Ok(());
        };
        let snap = self.raw_store.snapshot(receipt.schema_type);
        self.publisher
            .publish(Layer::Bronze, receipt.schema_type.as_str(), snap.version, || {
                serde_json::to_vec(&*snap.data)
            })
            .await?;
        if sink.find_batch(&receipt.content_hash).await?.is_none() {
            sink.record_batch(receipt).await?;
        }
        Ok(())
    }

    async fn archived_batch(&self, content_hash: &str) -> Result<Option<BatchReceipt>> {
        match self.publisher.sink() {
            Some(sink) => sink.find_batch(content_hash).await,
            None => Ok(None),
        }
    }
}
