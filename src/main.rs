//! # FieldLink
//!
//! Unattended link-quality and correction-stream telemetry collector.
//!
//! Samples each configured wireless client through the access point, watches
//! the RTK base station's RTCM stream, and appends both to shift-partitioned
//! files under the data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::interval;
use tracing::{info, warn};

use fieldlink::config::Config;
use fieldlink::logging::init_logging;
use fieldlink::source::{
    fixed_positions, polled_sources, stream_source, CommandQuery, MetricQuery, PositionSource,
};
use fieldlink::telemetry::{RecordSink, SampleStore, ShiftClock};
use fieldlink::worker::{Supervisor, WorkerReport, WorkerState};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for FieldLink
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging
///    - Open the sample store
///    - Start one poller per entity and one analyzer for the correction stream
///
/// 2. **Main Loop**
///    - Log a status summary and rewrite the status file periodically
///    - Handle Ctrl+C / SIGTERM for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Cancel all workers and wait for them within the shutdown timeout
///    - Write the final status file
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - Logging cannot be initialized
/// - The data directory cannot be created
///
/// A single misconfigured entity or stream endpoint does not stop startup;
/// its worker is listed as `STOPPED` instead.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging)?;
    info!("FieldLink v{} starting...", env!("CARGO_PKG_VERSION"));

    let clock = ShiftClock::new(config.storage.shift_boundary_hour)?;
    let store: Arc<dyn RecordSink> = Arc::new(
        SampleStore::open(&config.storage.data_dir, config.storage.sync_writes)
            .with_context(|| format!("failed to open data directory {}", config.storage.data_dir))?,
    );

    let mut supervisor = Supervisor::new(&config.supervisor);

    let query: Arc<dyn MetricQuery> = Arc::new(CommandQuery::from_config(&config.query));
    let positions: Arc<dyn PositionSource> = Arc::new(fixed_positions(&config.entities));
    for (name, source) in polled_sources(&config, query, positions) {
        match source {
            Ok(source) => supervisor.spawn(source.into_worker(&config, clock, store.clone())),
            Err(e) => supervisor.register_failed(&name, &e),
        }
    }

    if config.rtk.enabled {
        match stream_source(&config.rtk) {
            Ok(source) => supervisor.spawn(source.into_worker(&config, clock, store.clone())),
            Err(e) => supervisor.register_failed(&format!("analyzer:{}", config.rtk.name), &e),
        }
    } else {
        info!("Correction stream analysis disabled");
    }

    let status_path = status_file_path(&config);
    let mut status_interval = interval(config.supervisor.status_interval());

    info!(
        "Collecting into {} (shift boundary {:02}:00), status in {}",
        config.storage.data_dir,
        clock.boundary_hour(),
        status_path.display()
    );
    info!("Press Ctrl+C to exit");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                log_status(&supervisor.status());
                if let Err(e) = supervisor.write_status_file(&status_path) {
                    warn!(error = %e, "Failed to write status file {}", status_path.display());
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown requested, stopping workers...");
                break;
            }
        }
    }

    let registry = supervisor.registry();
    supervisor.shutdown(config.supervisor.shutdown_timeout()).await;
    if let Err(e) = registry.write_snapshot(&status_path) {
        warn!(error = %e, "Failed to write final status file");
    }

    info!("FieldLink stopped");
    Ok(())
}

/// Status file location; relative paths live in the data directory
fn status_file_path(config: &Config) -> PathBuf {
    Path::new(&config.storage.data_dir).join(&config.storage.status_file)
}

/// One summary line, plus a warning per worker that is not running
fn log_status(reports: &[WorkerReport]) {
    let running = reports
        .iter()
        .filter(|report| report.state == WorkerState::Running)
        .count();
    info!("{}/{} workers running", running, reports.len());

    for report in reports.iter().filter(|report| report.state != WorkerState::Running) {
        warn!(
            worker = %report.name,
            state = ?report.state,
            restarts = report.restarts,
            last_error = report.last_error.as_deref().unwrap_or("-"),
            "Worker not running"
        );
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
