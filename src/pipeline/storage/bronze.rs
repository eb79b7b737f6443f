use crate::domain::{BatchReceipt, RawRecord, SchemaType};
use crate::error::Result;
use crate::gateway::ScreenedFile;
use crate::idempotency;
use crate::metrics::StorageMetrics;
use crate::pipeline::storage::snapshot::{Snapshot, SnapshotTable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Bronze contents of one schema type: rows partitioned by date, plus the receipt of every batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BronzeTable {
    pub partitions: BTreeMap<NaiveDate, Arc<Vec<RawRecord>>>,
    /// Keyed by content hash
    pub receipts: BTreeMap<String, BatchReceipt>,
}

impl BronzeTable {
    pub fn row_count(&self) -> usize {
        self.partitions.values().map(|p| p.len()).sum()
    }
}

/// A screened file ready to be appended.
#[derive(Debug, Clone)]
pub struct BronzeBatch {
    pub batch_id: Uuid,
    pub schema_type: SchemaType,
    pub content_hash: String,
    pub source_name: String,
    pub rejected_rows: usize,
    pub ingested_at: DateTime<Utc>,
    /// Each record paired with the date the gatekeeper resolved for it
    pub records: Vec<(NaiveDate, RawRecord)>,
}

impl BronzeBatch {
    pub fn from_screened(screened: &ScreenedFile, source_name: &str, ingested_at: DateTime<Utc>) -> Self {
        let batch_id = idempotency::batch_id_for(&screened.content_hash);
        let records = screened
            .valid
            .iter()
            .map(|row| {
                let record = RawRecord {
                    schema_type: screened.schema_type,
                    ingest_batch_id: batch_id,
                    source_row: row.source_row,
                    source_row_hash: idempotency::source_row_hash(
                        screened.schema_type,
                        &batch_id,
                        row.source_row,
                        &row.fields,
                    ),
                    raw_fields: row.fields.clone(),
                    ingested_at,
                };
                (row.date, record)
            })
            .collect();

        Self {
            batch_id,
            schema_type: screened.schema_type,
            content_hash: screened.content_hash.clone(),
            source_name: source_name.to_string(),
            rejected_rows: screened.rejected_rows(),
            ingested_at,
            records,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "receipt", rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended(BatchReceipt),
    /// Same content was ingested before; nothing was written
    Duplicate(BatchReceipt),
}

impl AppendOutcome {
    pub fn receipt(&self) -> &BatchReceipt {
        match self {
            AppendOutcome::Appended(r) | AppendOutcome::Duplicate(r) => r,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::Duplicate(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BronzeStats {
    pub version: u64,
    pub rows: usize,
    pub partitions: usize,
    pub batches: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Append-only, lineage-preserving store of validated rows, one versioned partition per schema type.
pub struct RawStore {
    table: SnapshotTable<SchemaType, BronzeTable>,
}

impl RawStore {
    pub fn new(max_commit_retries: u32) -> Self {
        Self {
            table: SnapshotTable::new("bronze", max_commit_retries),
        }
    }

    /// Append a batch. A batch whose content hash is already recorded is a no-op that
    /// returns the original receipt.
    pub fn append(&self, batch: &BronzeBatch) -> Result<AppendOutcome> {
        let updated = self.table.update(&batch.schema_type, |snap| {
            if let Some(existing) = snap.data.receipts.get(&batch.content_hash) {
                return Ok((None, AppendOutcome::Duplicate(existing.clone())));
            }

            // Shallow clone: untouched date partitions stay shared with the previous version
            let mut next = (*snap.data).clone();
            let mut grouped: BTreeMap<NaiveDate, Vec<RawRecord>> = BTreeMap::new();
            for (date, record) in &batch.records {
                grouped.entry(*date).or_default().push(record.clone());
            }
            for (date, rows) in grouped {
                let partition = next.partitions.entry(date).or_default();
                Arc::make_mut(partition).extend(rows);
            }

            let receipt = BatchReceipt {
                batch_id: batch.batch_id,
                schema_type: batch.schema_type,
                content_hash: batch.content_hash.clone(),
                source_name: batch.source_name.clone(),
                accepted_rows: batch.records.len(),
                rejected_rows: batch.rejected_rows,
                bronze_version: snap.version + 1,
                ingested_at: batch.ingested_at,
            };
            next.receipts.insert(batch.content_hash.clone(), receipt.clone());
            Ok((Some(next), AppendOutcome::Appended(receipt)))
        })?;

        match &updated.outcome {
            AppendOutcome::Appended(receipt) => {
                StorageMetrics::record_batch_appended(batch.schema_type.as_str(), receipt.accepted_rows);
                StorageMetrics::set_bronze_rows(self.total_rows());
                info!(
                    batch_id = %receipt.batch_id,
                    schema = %receipt.schema_type,
                    rows = receipt.accepted_rows,
                    version = updated.version,
                    "Appended batch to Bronze"
                );
            }
            AppendOutcome::Duplicate(receipt) => {
                StorageMetrics::record_duplicate_batch();
                info!(
                    batch_id = %receipt.batch_id,
                    source = %batch.source_name,
                    "Batch already ingested, returning original receipt"
                );
            }
        }

        Ok(updated.outcome)
    }

    pub fn snapshot(&self, schema: SchemaType) -> Snapshot<BronzeTable> {
        self.table.read(&schema)
    }

    pub fn find_receipt(&self, content_hash: &str) -> Option<BatchReceipt> {
        SchemaType::ALL
            .iter()
            .find_map(|schema| self.table.read(schema).data.receipts.get(content_hash).cloned())
    }

    pub fn restore(&self, schema: SchemaType, version: u64, table: BronzeTable) -> bool {
        self.table.restore(schema, version, table)
    }

    pub fn total_rows(&self) -> usize {
        self.table
            .snapshot_all()
            .values()
            .map(|s| s.data.row_count())
            .sum()
    }

    pub fn stats(&self) -> BTreeMap<SchemaType, BronzeStats> {
        SchemaType::ALL
            .iter()
            .map(|schema| {
                let snap = self.table.read(schema);
                let stats = BronzeStats {
                    version: snap.version,
                    rows: snap.data.row_count(),
                    partitions: snap.data.partitions.len(),
                    batches: snap.data.receipts.len(),
                    first_date: snap.data.partitions.keys().next().copied(),
                    last_date: snap.data.partitions.keys().next_back().copied(),
                };
                (*schema, stats)
            })
            .collect()
    }
}
