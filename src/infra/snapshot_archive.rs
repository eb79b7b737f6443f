use crate::domain::BatchReceipt;
use crate::metrics::StorageMetrics;
use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// One archived snapshot version of a layer partition.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedVersion {
    pub layer: String,
    pub partition: String,
    pub version: u64,
    pub payload_ref: String,
}

/// Durable mirror of committed layer snapshots.
///
/// Payloads are content-addressed files under `cas/`; a SQLite catalog maps
/// `(layer, partition, version)` to the payload and keeps the batch dedupe index.
pub struct SnapshotArchive {
    root: PathBuf,
    conn: Mutex<Connection>,
}

impl SnapshotArchive {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> anyhow::Result<Self> {
        let root = data_root.as_ref().to_path_buf();
        let db_path = root.join("catalog").join("pulse.db");
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS layer_versions (
                layer         TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                version       INTEGER NOT NULL,
                payload_ref   TEXT NOT NULL,
                committed_at  TEXT NOT NULL,
                PRIMARY KEY (layer, partition_key, version)
            );
            CREATE TABLE IF NOT EXISTS batch_index (
                content_hash  TEXT PRIMARY KEY,
                batch_id      TEXT NOT NULL,
                schema_type   TEXT NOT NULL,
                receipt_json  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            root,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write bytes content-addressed; returns `cas:sha256:<hex>`.
    pub fn write_payload(&self, bytes: &[u8]) -> anyhow::Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hex = hex::encode(hasher.finalize());
        let dir = self.root.join("cas").join("sha256").join(&hex[0..2]).join(&hex[2..4]);
        fs::create_dir_all(&dir)?;
        let path = dir.join(&hex);
        if !path.exists() {
            // Write then rename so a crash never leaves a truncated payload under its hash
            let tmp = dir.join(format!("{}.tmp", hex));
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
        }
        StorageMetrics::record_archive_write(bytes.len());
        Ok(format!("cas:sha256:{}", hex))
    }

    pub fn read_payload(&self, payload_ref: &str) -> anyhow::Result<Vec<u8>> {
        let hex = payload_ref
            .strip_prefix("cas:sha256:")
            .filter(|h| h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| anyhow::anyhow!("not a cas payload reference: {}", payload_ref))?;
        let path = self
            .root
            .join("cas")
            .join("sha256")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex);
        Ok(fs::read(path)?)
    }

    /// Archive one committed version. The payload is written before the catalog row, so a
    /// catalog entry always points at a complete payload.
    pub fn record_version(&self, layer: &str, partition: &str, version: u64, payload: &[u8]) -> anyhow::Result<String> {
        let payload_ref = self.write_payload(payload)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO layer_versions (layer, partition_key, version, payload_ref, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![layer, partition, version as i64, payload_ref, Utc::now().to_rfc3339()],
        )?;
        debug!(layer, partition, version, payload_ref = %payload_ref, "Archived snapshot");
        Ok(payload_ref)
    }

    /// Highest archived version of every partition of a layer.
    pub fn latest_versions(&self, layer: &str) -> anyhow::Result<Vec<ArchivedVersion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT partition_key, version, payload_ref FROM layer_versions v
             WHERE layer = ?1
               AND version = (SELECT MAX(version) FROM layer_versions
                              WHERE layer = v.layer AND partition_key = v.partition_key)
             ORDER BY partition_key",
        )?;
        let mut rows = stmt.query(params![layer])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let version: i64 = row.get(1)?;
            out.push(ArchivedVersion {
                layer: layer.to_string(),
                partition: row.get(0)?,
                version: version as u64,
                payload_ref: row.get(2)?,
            });
        }
        Ok(out)
    }

    // Batch dedupe index
    pub fn put_batch(&self, receipt: &BatchReceipt) -> anyhow::Result<()> {
        let json = serde_json::to_string(receipt)?;
        self.conn().execute(
            "INSERT OR IGNORE INTO batch_index (content_hash, batch_id, schema_type, receipt_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                receipt.content_hash,
                receipt.batch_id.to_string(),
                receipt.schema_type.as_str(),
                json
            ],
        )?;
        Ok(())
    }

    pub fn get_batch(&self, content_hash: &str) -> anyhow::Result<Option<BatchReceipt>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT receipt_json FROM batch_index WHERE content_hash = ?1")?;
        let mut rows = stmt.query(params![content_hash])?;
        let mut json: Option<String> = None;
        if let Some(row) = rows.next()? {
            json = Some(row.get(0)?);
        }
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
