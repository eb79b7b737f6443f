//! Storage Phase Metrics
//!
//! Snapshot commits, optimistic-concurrency conflicts and Bronze batch appends.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct StorageMetrics;

impl StorageMetrics {
    pub fn record_commit(table: &str) {
        ::metrics::counter!(phase_metric!(counter, "storage", "commits"), "table" => table.to_string())
            .increment(1);
    }

    pub fn record_conflict(table: &str) {
        ::metrics::counter!(phase_metric!(counter, "storage", "conflicts"), "table" => table.to_string())
            .increment(1);
    }

    pub fn record_batch_appended(schema: &str, rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "storage", "batches_appended"), "schema" => schema.to_string())
            .increment(1);
        ::metrics::counter!(phase_metric!(counter, "storage", "bronze_rows_appended"), "schema" => schema.to_string())
            .increment(rows as u64);
    }

    pub fn record_duplicate_batch() {
        ::metrics::counter!(phase_metric!(counter, "storage", "duplicate_batches")).increment(1);
    }

    pub fn set_bronze_rows(total: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "storage", "bronze_rows")).set(total as f64);
    }

    pub fn record_archive_write(bytes: usize) {
        ::metrics::counter!(phase_metric!(counter, "storage", "archive_writes")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "storage", "archive_payload_bytes")).record(bytes as f64);
    }
}

impl PhaseMetrics for StorageMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_gauge, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "storage", "commits"),
            "Snapshot versions committed, by table"
        );
        describe_counter!(
            phase_metric!(counter, "storage", "conflicts"),
            "Commits that lost the optimistic version check and retried"
        );
        describe_counter!(
            phase_metric!(counter, "storage", "batches_appended"),
            "Batches appended to Bronze"
        );
        describe_counter!(
            phase_metric!(counter, "storage", "bronze_rows_appended"),
            "Rows appended to Bronze"
        );
        describe_counter!(
            phase_metric!(counter, "storage", "duplicate_batches"),
            "Re-submitted batches answered with their original receipt"
        );
        describe_gauge!(
            phase_metric!(gauge, "storage", "bronze_rows"),
            "Rows currently held in Bronze"
        );
        describe_counter!(
            phase_metric!(counter, "storage", "archive_writes"),
            "Snapshot payloads written to the archive"
        );
        describe_histogram!(
            phase_metric!(histogram, "storage", "archive_payload_bytes"),
            "Size of archived snapshot payloads"
        );
    }

    fn phase_name() -> &'static str {
        "storage"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "storage", "commits"),
                metric_type: MetricType::Counter,
                help: "Snapshot versions committed, by table",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "conflicts"),
                metric_type: MetricType::Counter,
                help: "Commits that lost the optimistic version check and retried",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "batches_appended"),
                metric_type: MetricType::Counter,
                help: "Batches appended to Bronze",
                labels: vec!["schema"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "bronze_rows_appended"),
                metric_type: MetricType::Counter,
                help: "Rows appended to Bronze",
                labels: vec!["schema"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "duplicate_batches"),
                metric_type: MetricType::Counter,
                help: "Re-submitted batches answered with their original receipt",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "storage", "bronze_rows"),
                metric_type: MetricType::Gauge,
                help: "Rows currently held in Bronze",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "archive_writes"),
                metric_type: MetricType::Counter,
                help: "Snapshot payloads written to the archive",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "storage", "archive_payload_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of archived snapshot payloads",
                labels: vec![],
            },
        ]
    }
}
