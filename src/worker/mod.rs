//! # Workers
//!
//! Long-running acquisition tasks and the supervisor that keeps them alive.
//!
//! Every [`MetricSource`] is owned by exactly one worker. Workers run until
//! their cancellation token fires; anything else that ends `run` (an error
//! or a panic) is treated as a crash and restarted with backoff.

pub mod analyzer;
pub mod backoff;
pub mod poller;
pub mod status;
pub mod supervisor;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::source::MetricSource;
use crate::telemetry::shift::local_now;
use crate::telemetry::{RecordSink, ShiftClock};

pub use analyzer::{StreamAnalyzer, StreamWindow};
pub use backoff::BackoffPolicy;
pub use poller::Poller;
pub use status::{StatusHandle, StatusRegistry, WorkerReport, WorkerState};
pub use supervisor::Supervisor;

/// A supervised long-running task
#[async_trait]
pub trait Worker: Send + Sync {
    /// Name shown in the status surface and in log fields
    fn name(&self) -> &str;

    /// Run until `cancel` fires
    ///
    /// Returning `Ok(())` before cancellation still counts as a crash.
    ///
    /// # Errors
    ///
    /// Returns error on a failure the worker cannot absorb itself
    async fn run(&self, status: &StatusHandle, cancel: &CancellationToken) -> Result<()>;
}

impl MetricSource {
    /// Wrap the source in the worker that owns it
    pub fn into_worker(self, config: &Config, clock: ShiftClock, sink: Arc<dyn RecordSink>) -> Arc<dyn Worker> {
        match self {
            MetricSource::Polled(source) => Arc::new(Poller::new(source, &config.poller, clock, sink)),
            MetricSource::Stream(source) => Arc::new(StreamAnalyzer::new(source, &config.rtk, clock, sink)),
        }
    }
}

/// Wall clock that never runs backwards
///
/// Rows written by one worker keep non-decreasing timestamps even if the
/// system clock is stepped back.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<NaiveDateTime>,
}

impl MonotonicClock {
    pub fn now(&mut self) -> NaiveDateTime {
        self.observe(local_now())
    }

    /// Clamp `timestamp` to the latest one seen so far
    pub fn observe(&mut self, timestamp: NaiveDateTime) -> NaiveDateTime {
        let timestamp = match self.last {
            Some(last) if last > timestamp => last,
            _ => timestamp,
        };
        self.last = Some(timestamp);
        timestamp
    }
}
