//! # Supervisor
//!
//! Runs every worker as its own task and restarts it when it crashes.
//!
//! Each worker is driven by a small supervision loop: the worker itself runs
//! in a nested task so a panic surfaces as a join error instead of taking the
//! loop down. After a crash the loop waits out an exponential backoff and
//! starts the worker again. A worker that ran at least `reset_after` before
//! crashing restarts from the base delay.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::backoff::BackoffPolicy;
use super::status::{StatusHandle, StatusRegistry, WorkerReport, WorkerState};
use super::Worker;
use crate::config::SupervisorConfig;
use crate::error::{FieldLinkError, Result};

/// Owns all worker tasks and their status
pub struct Supervisor {
    registry: StatusRegistry,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    restart_base: Duration,
    restart_max: Duration,
    reset_after: Duration,
}

impl Supervisor {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            registry: StatusRegistry::new(),
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            restart_base: config.restart_base(),
            restart_max: config.restart_max(),
            reset_after: config.reset_after(),
        }
    }

    /// Start supervising `worker`
    pub fn spawn(&mut self, worker: Arc<dyn Worker>) {
        let status = self.registry.register(worker.name());
        let backoff = BackoffPolicy::new(self.restart_base, self.restart_max, self.reset_after);
        let cancel = self.cancel.child_token();

        info!(worker = %worker.name(), "Starting worker");
        self.tasks.spawn(supervise(worker, status, cancel, backoff));
    }

    /// List a worker that could not be built; it stays `STOPPED`
    pub fn register_failed(&self, name: &str, reason: &FieldLinkError) {
        error!(worker = %name, error = %reason, "Worker not started");
        let status = self.registry.register(name);
        status.record_error(&reason.to_string());
        status.set_state(WorkerState::Stopped);
    }

    pub fn registry(&self) -> StatusRegistry {
        self.registry.clone()
    }

    /// Current report for every worker, ordered by name
    pub fn status(&self) -> Vec<WorkerReport> {
        self.registry.snapshot()
    }

    /// Write [`Supervisor::status`] to `path` as JSON
    pub fn write_status_file(&self, path: &Path) -> Result<()> {
        self.registry.write_snapshot(path)
    }

    /// Number of supervised workers still running
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every worker and wait up to `grace` for them to finish
    ///
    /// Workers still running after `grace` are aborted.
    pub async fn shutdown(mut self, grace: Duration) {
        info!("Stopping {} workers", self.tasks.len());
        self.cancel.cancel();

        let drained = timeout(grace, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Supervision task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("{} workers did not stop within {:?}, aborting", self.tasks.len(), grace);
            self.tasks.shutdown().await;
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn supervise(worker: Arc<dyn Worker>, status: StatusHandle, cancel: CancellationToken, mut backoff: BackoffPolicy) {
    loop {
        status.set_state(WorkerState::Running);
        let started = Instant::now();

        let mut task = AbortOnDrop(tokio::spawn({
            let worker = worker.clone();
            let status = status.clone();
            let cancel = cancel.clone();
            async move { worker.run(&status, &cancel).await }
        }));
        let result = (&mut task.0).await;

        if cancel.is_cancelled() {
            break;
        }

        let reason = match result {
            Ok(Ok(())) => "worker exited before shutdown".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(e) => describe_join_error(e),
        };

        let delay = backoff.on_failure(started.elapsed());
        status.record_error(&reason);
        status.record_restart();
        status.set_state(WorkerState::Backoff);
        warn!(
            worker = %worker.name(),
            error = %reason,
            failures = backoff.consecutive_failures(),
            "Worker crashed, restarting in {:?}",
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    status.set_state(WorkerState::Stopped);
    info!(worker = %worker.name(), "Worker stopped");
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        format!("worker panicked: {}", panic_message(error.into_panic()))
    } else {
        error.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
