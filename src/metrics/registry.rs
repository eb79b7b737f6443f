//! Metrics registry for coordinating phase-specific metrics
//!
//! Registers the metrics of every phase, validates naming consistency, and
//! detects conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

/// Register all metrics from all phases
pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::gatekeeper::GatekeeperMetrics>(&mut all_metrics);
    register_phase_metrics::<super::storage::StorageMetrics>(&mut all_metrics);
    register_phase_metrics::<super::transform::TransformMetrics>(&mut all_metrics);
    register_phase_metrics::<super::classifier::ClassifierMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );

    if std::env::var("PULSE_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_docs = T::metrics_documentation();
    let phase_name = T::phase_name();

    info!(
        "Registering {} metrics for phase '{}'",
        phase_docs.len(),
        phase_name
    );

    for doc in phase_docs {
        if extract_phase_from_metric_name(doc.name) != phase_name {
            warn!(
                "Metric '{}' does not carry the prefix of its phase '{}'",
                doc.name, phase_name
            );
        }
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' registered again by phase '{}'",
                doc.name, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

fn log_metrics_summary(all_metrics: &HashMap<String, MetricDoc>) {
    info!("=== Metrics Registry Summary ===");

    let mut by_phase: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for doc in all_metrics.values() {
        by_phase
            .entry(extract_phase_from_metric_name(doc.name))
            .or_default()
            .push(doc);
    }

    for (phase, metrics) in by_phase {
        info!("Phase '{}': {} metrics", phase, metrics.len());
        for metric in metrics {
            info!(
                "  - {} ({:?}, labels {:?}): {}",
                metric.name, metric.metric_type, metric.labels, metric.help
            );
        }
    }

    info!("=== End Metrics Summary ===");
}

/// Extract phase name from metric name (e.g., "pulse_gatekeeper_rows_total" -> "gatekeeper")
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("pulse_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ClassifierMetrics, GatekeeperMetrics, StorageMetrics, TransformMetrics};

    #[test]
    fn test_extract_phase_from_metric_name() {
        assert_eq!(
            extract_phase_from_metric_name("pulse_gatekeeper_rows_rejected_total"),
            "gatekeeper"
        );
        assert_eq!(
            extract_phase_from_metric_name("pulse_classifier_inertia"),
            "classifier"
        );
        assert_eq!(extract_phase_from_metric_name("invalid_metric_name"), "unknown");
    }

    #[test]
    fn test_every_documented_metric_carries_its_phase_prefix() {
        let phases = [
            (GatekeeperMetrics::phase_name(), GatekeeperMetrics::metrics_documentation()),
            (StorageMetrics::phase_name(), StorageMetrics::metrics_documentation()),
            (TransformMetrics::phase_name(), TransformMetrics::metrics_documentation()),
            (ClassifierMetrics::phase_name(), ClassifierMetrics::metrics_documentation()),
        ];
        for (phase, docs) in phases {
            assert!(!docs.is_empty());
            for doc in docs {
                assert_eq!(extract_phase_from_metric_name(doc.name), phase, "{}", doc.name);
            }
        }
    }
}
