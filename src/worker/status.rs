//! # Worker Status
//!
//! Per-worker health as seen by the supervisor and written to the status
//! file: current state, last success, last error, and restart count.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crate::telemetry::shift::local_now;

/// Lifecycle state of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerState {
    Running,
    Stopped,
    Backoff,
}

/// Snapshot of one worker's health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub name: String,
    pub state: WorkerState,
    pub last_success: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub last_error_at: Option<NaiveDateTime>,
    pub restarts: u32,
}

impl WorkerReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: WorkerState::Stopped,
            last_success: None,
            last_error: None,
            last_error_at: None,
            restarts: 0,
        }
    }
}

/// Shared table of worker reports, keyed by worker name
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    reports: Arc<RwLock<BTreeMap<String, WorkerReport>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker (or reuse its existing entry) and hand out its handle
    pub fn register(&self, name: &str) -> StatusHandle {
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| WorkerReport::new(name));

        StatusHandle {
            name: name.to_string(),
            registry: self.clone(),
        }
    }

    /// All reports, ordered by worker name
    pub fn snapshot(&self) -> Vec<WorkerReport> {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<WorkerReport> {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Write the snapshot as pretty JSON, replacing `path` atomically
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be written or renamed
    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn update(&self, name: &str, apply: impl FnOnce(&mut WorkerReport)) {
        let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
        let report = reports
            .entry(name.to_string())
            .or_insert_with(|| WorkerReport::new(name));
        apply(report);
    }
}

/// One worker's write access to its own report
#[derive(Debug, Clone)]
pub struct StatusHandle {
    name: String,
    registry: StatusRegistry,
}

impl StatusHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_state(&self, state: WorkerState) {
        self.registry.update(&self.name, |report| report.state = state);
    }

    pub fn record_success(&self, at: NaiveDateTime) {
        self.registry.update(&self.name, |report| report.last_success = Some(at));
    }

    pub fn record_error(&self, error: &str) {
        let at = local_now();
        self.registry.update(&self.name, |report| {
            report.last_error = Some(error.to_string());
            report.last_error_at = Some(at);
        });
    }

    pub fn record_restart(&self) {
        self.registry.update(&self.name, |report| report.restarts += 1);
    }

    pub fn report(&self) -> Option<WorkerReport> {
        self.registry.get(&self.name)
    }
}
