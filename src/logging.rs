//! # Logging
//!
//! Structured logging through `tracing`. Console output always; a daily
//! rolling file as well when `logging.log_dir` is set. `RUST_LOG` overrides
//! the configured level.

use std::fs;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Prefix of the rolling log files
const LOG_FILE_PREFIX: &str = "fieldlink.log";

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(level: &str) -> String {
    format!("{level},fieldlink={level}", level = level)
}

/// Install the global subscriber
///
/// # Returns
///
/// * `Result<Option<WorkerGuard>>` - Guard for the file writer; keep it alive
///   until shutdown so buffered lines are flushed
///
/// # Errors
///
/// Returns error if the log directory cannot be created or a subscriber is
/// already installed
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));
    let console_layer = fmt::layer().with_target(true);

    let (file_layer, guard) = if config.log_dir.is_empty() {
        (None, None)
    } else {
        fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    Ok(guard)
}
