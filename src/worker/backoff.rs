//! Exponential restart delays.

use std::time::Duration;
use tokio::time::Instant;

/// Largest exponent applied to the base delay
const MAX_EXPONENT: u32 = 20;

/// Doubling delay between consecutive failures, capped at `max`
///
/// A run that lasted at least `reset_after` counts as healthy and starts
/// the sequence over from `base`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    reset_after: Duration,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, reset_after: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            reset_after,
            consecutive_failures: 0,
            last_failure: None,
        }
    }

    /// Record a failure after a run of `ran_for` and return the delay
    /// before the next attempt
    pub fn on_failure(&mut self, ran_for: Duration) -> Duration {
        if ran_for >= self.reset_after {
            self.reset();
        }

        let exponent = self.consecutive_failures.min(MAX_EXPONENT);
        let delay = self.base.saturating_mul(1u32 << exponent).min(self.max);

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
        delay
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }
}
