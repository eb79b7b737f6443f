use crate::config::LoggingConfig;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "aadhaar_pulse=info";

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer when dropped; keep it alive for the process lifetime.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    // Each branch builds its own console layer: a layer is typed by the subscriber stack it sits on.
    // Console goes to stderr so stdout stays clean for JSON reports.
    if fs::create_dir_all(&config.log_dir).is_err() {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, &config.file_prefix);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unusable_log_dir_falls_back_to_console_only() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let config = LoggingConfig {
            log_dir: blocker.join("logs"),
            file_prefix: "pulse.log".to_string(),
        };
        assert!(init_logging(&config).is_none());
    }

    #[test]
    fn test_writable_log_dir_returns_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: dir.path().join("logs"),
            file_prefix: "pulse.log".to_string(),
        };
        let guard = init_logging(&config);
        assert!(guard.is_some());
        assert!(config.log_dir.is_dir());
    }
}
