//! Pacing and bounded retry with exponential backoff for exchange calls.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::order::OrderPhase;
use crate::config::{RateLimitConfig, RetryConfig};
use crate::error::{ExchangeError, ExecutionError};
use crate::metrics;

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// Retry budget and backoff shape.
///
/// Attempt `n` (1-based) that fails waits `base_sleep * 2^(n-1)` plus a
/// uniform jitter in `[0, jitter]` before attempt `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Never below 1.
    pub max_attempts: u32,
    /// Backoff base.
    pub base_sleep: Duration,
    /// Upper bound of random extra delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_sleep: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_sleep: Duration::from_secs_f64(config.base_sleep_seconds.max(0.0)),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait after failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_sleep.saturating_mul(1u32 << exp)
    }

    /// Full wait after failed attempt `attempt`, jitter included.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + random_jitter(self.jitter)
    }
}

/// Enforces a minimum interval between exchange calls, plus jitter.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    jitter: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl From<&RateLimitConfig> for Pacer {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(config.min_interval_seconds.max(0.0)),
            Duration::from_millis(config.jitter_ms),
        )
    }
}

impl Pacer {
    /// Create a pacer.
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            min_interval,
            jitter,
            last_call: Mutex::new(None),
        }
    }

    /// A pacer that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Wait until the next call is allowed, then mark it as made.
    pub async fn pace(&self) {
        let mut last_call = self.last_call.lock().await;

        let remaining = match *last_call {
            Some(at) => self.min_interval.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        };
        let wait = remaining + random_jitter(self.jitter);
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Pacing exchange call");
            sleep(wait).await;
        }

        *last_call = Some(Instant::now());
    }
}

/// Successful result of [`with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// Value returned by the successful attempt.
    pub value: T,
    /// 1-based attempt that succeeded.
    pub attempt: u32,
    /// Duration of the successful attempt.
    pub latency: Duration,
}

/// Run `call` until it succeeds, fails permanently, or the budget is spent.
///
/// `call` receives the 1-based attempt number. Only retryable exchange
/// errors are retried; anything else becomes [`ExecutionError::Rejected`]
/// immediately. Every failed attempt is logged with `error_event`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    error_event: &'static str,
    mut call: F,
) -> Result<Attempted<T>, ExecutionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(operation, attempt, phase = %OrderPhase::Submitting, "Attempting exchange call");
        let start = Instant::now();

        match call(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempt,
                    latency: start.elapsed(),
                })
            }
            Err(e) if !e.is_retryable() => {
                warn!(
                    event = error_event,
                    operation,
                    attempt,
                    phase = %OrderPhase::Rejected,
                    error = %e,
                    "Exchange call rejected"
                );
                return Err(ExecutionError::Rejected(e));
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    event = error_event,
                    operation,
                    attempt,
                    phase = %OrderPhase::Failed,
                    error = %e,
                    "Exchange call failed, retry budget exhausted"
                );
                return Err(ExecutionError::Exhausted {
                    operation,
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    event = error_event,
                    operation,
                    attempt,
                    phase = %OrderPhase::Submitting,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Exchange call failed, retrying"
                );
                metrics::inc_retries(operation);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
