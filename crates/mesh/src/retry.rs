//! Bounded retry with exponential backoff.
//!
//! One counter guards each independently retried operation (uplink probe,
//! report send, sensor re-init). The counter only does bookkeeping; the owner
//! decides what "exhausted" means (demotion, disabling a sensor) and restarts it.

use std::time::Duration;
use worknet_core::RetryConfig;

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Still within budget; wait `delay` before the next attempt
    Retry {
        /// Backoff before the next attempt
        delay: Duration,
    },
    /// `consecutive_failures > allowed_failures`
    Exhausted,
}

/// Consecutive-failure counter with doubling backoff.
#[derive(Debug, Clone)]
pub struct RetryCounter {
    consecutive_failures: u32,
    allowed_failures: u32,
    interval: Duration,
    min_interval: Duration,
    max_interval: Duration,
}

impl RetryCounter {
    /// Create a counter. `max_interval` is raised to `min_interval` if smaller.
    pub fn new(allowed_failures: u32, min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            allowed_failures,
            interval: Duration::ZERO,
            min_interval,
            max_interval: max_interval.max(min_interval),
        }
    }

    /// Build from the `[retry]` configuration section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.allowed_failures,
            config.min_interval(),
            config.max_interval(),
        )
    }

    /// Reset after a successful attempt.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.interval = Duration::ZERO;
    }

    /// Count a failure and grow the backoff.
    pub fn record_failure(&mut self) -> RetryState {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.interval = if self.interval.is_zero() {
            self.min_interval
        } else {
            (self.interval * 2).min(self.max_interval)
        };

        if self.is_exhausted() {
            RetryState::Exhausted
        } else {
            RetryState::Retry {
                delay: self.interval,
            }
        }
    }

    /// Whether the failure budget has been exceeded.
    pub fn is_exhausted(&self) -> bool {
        self.consecutive_failures > self.allowed_failures
    }

    /// Start a fresh budget after the owner has acted on exhaustion.
    pub fn restart(&mut self) {
        self.consecutive_failures = 0;
        self.interval = Duration::ZERO;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current backoff; zero when the last attempt succeeded.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
