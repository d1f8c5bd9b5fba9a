//! Tracing subscriber setup.
//!
//! Logs always go to stderr. When `logging.directory` is configured they are
//! also written to daily-rotated files in that directory, keeping
//! `retention_days` files.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Prefix of rotated log files.
const LOG_FILE_PREFIX: &str = "filebridge";

/// The configured level, raised to `debug` by `verbose`.
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.level.to_lowercase()
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the lifetime of the process.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbose)));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory: {}", directory.display())
            })?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .max_log_files(config.retention_days)
                .build(directory)
                .context("Failed to create log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_uses_config_level() {
        let config = LoggingConfig {
            level: "WARN".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&config, false), "warn");
    }

    #[test]
    fn test_filter_directive_verbose_overrides() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directive(&config, true), "debug");
    }
}
