//! Retry with exponential backoff for provider calls.
//!
//! ```text
//! attempt 1 ──fail──► wait d1 ──► attempt 2 ──fail──► wait d2 ──► attempt 3 ──fail──► give up
//!
//! floor(k) = min(base * 2^(k-1), max_delay)
//! d(k)     = max(floor(k), retry_after, d(k-1))
//! ```
//!
//! A provider-declared `retry_after` is never shortened, and the schedule
//! never decreases for the same request.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::provider::ProviderError;

/// Hard cap on attempts per provider per request.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff parameters for one provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Backoff floor before retry number `retry` (1-based).
    pub fn floor(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Start a fresh schedule for one request.
    pub fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            policy: *self,
            attempts: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `label` names the caller in logs (typically the provider id).
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut schedule = self.schedule();
        let mut delays = Vec::new();
        loop {
            let attempt = schedule.begin_attempt();
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(provider = label, attempt, "Succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        delays,
                    };
                }
                Err(err) => match schedule.next_delay(&err) {
                    Some(delay) => {
                        warn!(
                            provider = label,
                            attempt,
                            error_kind = %err.kind(),
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Provider call failed, retrying"
                        );
                        delays.push(delay);
                        sleep(delay).await;
                    }
                    None => {
                        warn!(
                            provider = label,
                            attempt,
                            error_kind = %err.kind(),
                            error = %err,
                            "Provider call failed, giving up"
                        );
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt,
                            delays,
                        };
                    }
                },
            }
        }
    }
}

/// Mutable backoff state for a single request.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts: u32,
    last_delay: Duration,
}

impl RetrySchedule {
    /// Record the start of an attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` when the request must stop.
    pub fn next_delay(&mut self, err: &ProviderError) -> Option<Duration> {
        if !err.is_retriable() || self.attempts >= self.policy.max_attempts {
            return None;
        }
        let floor = self.policy.floor(self.attempts);
        let mut delay = floor.max(self.last_delay);
        if let Some(retry_after) = err.retry_after() {
            delay = delay.max(retry_after);
        }
        self.last_delay = delay;
        Some(delay)
    }
}

/// Result of a retried operation plus its attempt history.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ProviderError>,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}
