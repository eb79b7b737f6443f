//! Transform Phase Metrics
//!
//! Silver rebuilds and Gold scoring runs.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct TransformMetrics;

impl TransformMetrics {
    pub fn record_silver_run(schema: &str, facts: usize, duplicates_dropped: usize, committed: bool) {
        ::metrics::counter!(phase_metric!(counter, "transform", "silver_runs"), "schema" => schema.to_string(), "committed" => committed.to_string())
            .increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "transform", "silver_facts"), "schema" => schema.to_string())
            .set(facts as f64);
        ::metrics::counter!(phase_metric!(counter, "transform", "duplicates_dropped"), "schema" => schema.to_string())
            .increment(duplicates_dropped as u64);
    }

    pub fn record_gold_run(scored: usize, insufficient: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "transform", "gold_runs")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "transform", "districts_scored")).increment(scored as u64);
        ::metrics::counter!(phase_metric!(counter, "transform", "districts_insufficient"))
            .increment(insufficient as u64);
        ::metrics::histogram!(phase_metric!(histogram, "transform", "gold_duration_seconds")).record(duration_secs);
    }
}

impl PhaseMetrics for TransformMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_gauge, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "transform", "silver_runs"),
            "Silver rebuilds, by schema and whether a new version was committed"
        );
        describe_gauge!(
            phase_metric!(gauge, "transform", "silver_facts"),
            "Facts in the latest Silver snapshot"
        );
        describe_counter!(
            phase_metric!(counter, "transform", "duplicates_dropped"),
            "Duplicate (schema, date, pincode) rows dropped by Silver"
        );
        describe_counter!(
            phase_metric!(counter, "transform", "gold_runs"),
            "Gold aggregation runs"
        );
        describe_counter!(
            phase_metric!(counter, "transform", "districts_scored"),
            "Districts given a feature vector"
        );
        describe_counter!(
            phase_metric!(counter, "transform", "districts_insufficient"),
            "Districts reported as insufficient data"
        );
        describe_histogram!(
            phase_metric!(histogram, "transform", "gold_duration_seconds"),
            "Wall time of a Gold aggregation run"
        );
    }

    fn phase_name() -> &'static str {
        "transform"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "transform", "silver_runs"),
                metric_type: MetricType::Counter,
                help: "Silver rebuilds, by schema and whether a new version was committed",
                labels: vec!["schema", "committed"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "transform", "silver_facts"),
                metric_type: MetricType::Gauge,
                help: "Facts in the latest Silver snapshot",
                labels: vec!["schema"],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "duplicates_dropped"),
                metric_type: MetricType::Counter,
                help: "Duplicate (schema, date, pincode) rows dropped by Silver",
                labels: vec!["schema"],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "gold_runs"),
                metric_type: MetricType::Counter,
                help: "Gold aggregation runs",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "districts_scored"),
                metric_type: MetricType::Counter,
                help: "Districts given a feature vector",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "districts_insufficient"),
                metric_type: MetricType::Counter,
                help: "Districts reported as insufficient data",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "transform", "gold_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a Gold aggregation run",
                labels: vec![],
            },
        ]
    }
}
