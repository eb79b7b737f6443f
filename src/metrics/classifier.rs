//! Classifier Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct ClassifierMetrics;

impl ClassifierMetrics {
    pub fn record_run(labelled: usize, excluded: usize, inertia: f64) {
        ::metrics::counter!(phase_metric!(counter, "classifier", "runs")).increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "classifier", "districts_labelled")).set(labelled as f64);
        ::metrics::gauge!(phase_metric!(gauge, "classifier", "districts_excluded")).set(excluded as f64);
        ::metrics::gauge!(phase_metric!(gauge, "classifier", "inertia")).set(inertia);
    }

    pub fn record_quantile_fallback() {
        ::metrics::counter!(phase_metric!(counter, "classifier", "quantile_fallbacks")).increment(1);
    }

    pub fn record_skipped() {
        ::metrics::counter!(phase_metric!(counter, "classifier", "skipped")).increment(1);
    }
}

impl PhaseMetrics for ClassifierMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_gauge};

        describe_counter!(phase_metric!(counter, "classifier", "runs"), "Classifier fits");
        describe_counter!(
            phase_metric!(counter, "classifier", "skipped"),
            "Runs skipped because fewer districts than clusters were eligible"
        );
        describe_counter!(
            phase_metric!(counter, "classifier", "quantile_fallbacks"),
            "Runs labelled by growth and volatility quantiles because a cluster was too small"
        );
        describe_gauge!(
            phase_metric!(gauge, "classifier", "districts_labelled"),
            "Districts given a maturity label in the latest run"
        );
        describe_gauge!(
            phase_metric!(gauge, "classifier", "districts_excluded"),
            "Districts left unlabelled in the latest run"
        );
        describe_gauge!(
            phase_metric!(gauge, "classifier", "inertia"),
            "Within-cluster sum of squares of the chosen fit"
        );
    }

    fn phase_name() -> &'static str {
        "classifier"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "classifier", "runs"),
                metric_type: MetricType::Counter,
                help: "Classifier fits",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "classifier", "skipped"),
                metric_type: MetricType::Counter,
                help: "Runs skipped because fewer districts than clusters were eligible",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "classifier", "quantile_fallbacks"),
                metric_type: MetricType::Counter,
                help: "Runs labelled by growth and volatility quantiles because a cluster was too small",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "classifier", "districts_labelled"),
                metric_type: MetricType::Gauge,
                help: "Districts given a maturity label in the latest run",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "classifier", "districts_excluded"),
                metric_type: MetricType::Gauge,
                help: "Districts left unlabelled in the latest run",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "classifier", "inertia"),
                metric_type: MetricType::Gauge,
                help: "Within-cluster sum of squares of the chosen fit",
                labels: vec![],
            },
        ]
    }
}
