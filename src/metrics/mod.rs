//! Centralized metrics infrastructure for the pulse pipeline
//!
//! Each pipeline phase defines its own metrics in a dedicated submodule, ensuring
//! clear ownership and preventing naming conflicts.

pub mod classifier;
pub mod gatekeeper;
pub mod registry;
pub mod storage;
pub mod transform;

pub use classifier::ClassifierMetrics;
pub use gatekeeper::GatekeeperMetrics;
pub use storage::StorageMetrics;
pub use transform::TransformMetrics;

use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Initialize the global metrics infrastructure
///
/// Idempotent. Installs a Prometheus recorder, with an HTTP listener only when
/// `PULSE_METRICS_ADDR` is set, and registers every phase's metric descriptions.
pub fn init_metrics() {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

        let listen_addr = std::env::var("PULSE_METRICS_ADDR").ok().and_then(|raw| {
            match raw.parse::<std::net::SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!("Invalid metrics addr '{}', exporter disabled", raw);
                    None
                }
            }
        });

        let installed = match listen_addr {
            // The exporter task needs a running tokio runtime
            Some(addr) => builder.with_http_listener(addr).install().map(|()| {
                info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
            }),
            None => builder.install_recorder().map(|handle| {
                if HANDLE.set(handle).is_err() {
                    warn!("METRICS: recorder handle was already stored");
                }
            }),
        };

        match installed {
            Ok(()) => {
                registry::register_all_metrics();
                info!("All pipeline metrics registered successfully");
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

/// Render the current metric values in Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names of the form `pulse_{phase}_{name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("pulse_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("pulse_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("pulse_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exposes_recorded_values() {
        std::env::remove_var("PULSE_METRICS_ADDR");
        init_metrics();
        GatekeeperMetrics::record_schema_unrecognized();

        let text = render().expect("recorder installed without a listener");
        assert!(text.contains("pulse_gatekeeper_schema_unrecognized_total"));
    }

    #[test]
    fn test_metric_naming_convention() {
        assert_eq!(
            phase_metric!(counter, "gatekeeper", "rows_rejected"),
            "pulse_gatekeeper_rows_rejected_total"
        );
        assert_eq!(
            phase_metric!(histogram, "transform", "stage_duration_seconds"),
            "pulse_transform_stage_duration_seconds"
        );
        assert_eq!(
            phase_metric!(gauge, "storage", "bronze_rows"),
            "pulse_storage_bronze_rows"
        );
    }
}
