//! Gatekeeper Phase Metrics
//!
//! Metrics for schema classification and row screening of uploaded files.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for the Gatekeeper phase
pub struct GatekeeperMetrics;

impl GatekeeperMetrics {
    /// Record a file that was classified and screened
    pub fn record_file_screened(schema: &str, accepted: usize, rejected: usize) {
        ::metrics::counter!(phase_metric!(counter, "gatekeeper", "files_screened"), "schema" => schema.to_string())
            .increment(1);
        ::metrics::counter!(phase_metric!(counter, "gatekeeper", "rows_accepted"), "schema" => schema.to_string())
            .increment(accepted as u64);
        ::metrics::histogram!(phase_metric!(histogram, "gatekeeper", "rejected_rows_per_file"))
            .record(rejected as f64);
    }

    /// Record a single rejected row by reason code
    pub fn record_row_rejected(reason_code: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "gatekeeper", "rows_rejected"), "reason" => reason_code)
            .increment(1);
    }

    /// Record a whole-file rejection because no signature matched
    pub fn record_schema_unrecognized() {
        ::metrics::counter!(phase_metric!(counter, "gatekeeper", "schema_unrecognized")).increment(1);
    }
}

impl PhaseMetrics for GatekeeperMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "gatekeeper", "files_screened"),
            "Total number of files classified and screened"
        );
        describe_counter!(
            phase_metric!(counter, "gatekeeper", "rows_accepted"),
            "Total number of rows that passed validation"
        );
        describe_counter!(
            phase_metric!(counter, "gatekeeper", "rows_rejected"),
            "Total number of rows rejected, by reason code"
        );
        describe_counter!(
            phase_metric!(counter, "gatekeeper", "schema_unrecognized"),
            "Total number of files rejected for an unrecognized header"
        );
        describe_histogram!(
            phase_metric!(histogram, "gatekeeper", "rejected_rows_per_file"),
            "Rejected rows per screened file"
        );
    }

    fn phase_name() -> &'static str {
        "gatekeeper"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "gatekeeper", "files_screened"),
                metric_type: MetricType::Counter,
                help: "Total number of files classified and screened",
                labels: vec!["schema"],
            },
            MetricDoc {
                name: phase_metric!(counter, "gatekeeper", "rows_accepted"),
                metric_type: MetricType::Counter,
                help: "Total number of rows that passed validation",
                labels: vec!["schema"],
            },
            MetricDoc {
                name: phase_metric!(counter, "gatekeeper", "rows_rejected"),
                metric_type: MetricType::Counter,
                help: "Total number of rows rejected, by reason code",
                labels: vec!["reason"],
            },
            MetricDoc {
                name: phase_metric!(counter, "gatekeeper", "schema_unrecognized"),
                metric_type: MetricType::Counter,
                help: "Total number of files rejected for an unrecognized header",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "gatekeeper", "rejected_rows_per_file"),
                metric_type: MetricType::Histogram,
                help: "Rejected rows per screened file",
                labels: vec![],
            },
        ]
    }
}
