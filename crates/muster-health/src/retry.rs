//! Bounded retry with capped exponential backoff and jitter.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use muster_core::config::RetryConfig;

use crate::breaker::CircuitBreaker;
use crate::classify::Classify;
use crate::error::RetryError;

/// Retry settings for database round trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added before capping.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Sleep taken after failed attempt `attempt` (1-based):
    /// `min(base * 2^(attempt-1) + jitter, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff_ms = base_ms.saturating_mul(1u64 << exponent);

        let jitter_cap = self.jitter.as_millis() as u64;
        let jitter_ms = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };

        let max_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(backoff_ms.saturating_add(jitter_ms).min(max_ms))
    }

    /// Run `op` until it succeeds, fails with a non-connectivity error, or
    /// the attempts run out.
    ///
    /// A success resets `breaker`. Exhausting every attempt records one
    /// breaker failure, so the circuit opens after repeated exhaustion across
    /// calls rather than after single transient blips. Logic errors leave the
    /// breaker untouched.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        operation: &str,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "database operation succeeded after retry");
                    }
                    breaker.reset_failures();
                    return Ok(value);
                }
                Err(e) if !e.is_connectivity() => {
                    warn!(operation, error = %e, "database operation failed (not retryable)");
                    return Err(RetryError::Fatal(e));
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        operation,
                        attempts = attempt,
                        error = %e,
                        "database operation failed, retries exhausted"
                    );
                    breaker.record_failure();
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "database connectivity error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
