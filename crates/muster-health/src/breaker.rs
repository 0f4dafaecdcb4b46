//! Database circuit breaker.
//!
//! One instance is shared (behind an `Arc`) by the scheduler, the reconciler
//! and the button handlers. Counters are plain atomics: concurrent updates
//! may race, which is fine for a best-effort availability heuristic.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info};

use muster_core::config::HealthConfig;

/// Point-in-time view of the breaker, for logs and health output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub failures: u32,
    pub threshold: u32,
    /// Milliseconds since the most recent failure, if one is recorded.
    pub since_last_failure_ms: Option<u64>,
}

/// Consecutive-failure circuit breaker with a single-probe half-open state.
///
/// * `failures < threshold` → closed.
/// * `failures >= threshold` and the last failure is younger than the
///   recovery window → open.
/// * Window elapsed → the next [`is_open`](Self::is_open) call decrements the
///   count by one and reports closed, letting exactly one probe through. A
///   failing probe re-opens the breaker; a success fully closes it.
pub struct CircuitBreaker {
    failures: AtomicU32,
    /// Milliseconds since `epoch` of the last failure, plus one. 0 = none.
    last_failure: AtomicU64,
    alerted: AtomicBool,
    epoch: Instant,
    threshold: u32,
    recovery: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
            alerted: AtomicBool::new(false),
            epoch: Instant::now(),
            threshold: threshold.max(1),
            recovery,
        }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(config.failure_threshold, config.recovery_window())
    }

    /// True while database work should be skipped entirely.
    pub fn is_open(&self) -> bool {
        let failures = self.failures.load(Ordering::Acquire);
        if failures < self.threshold {
            return false;
        }
        let Some(since) = self.since_last_failure() else {
            return false;
        };
        if since < self.recovery {
            return true;
        }

        // Recovery window elapsed: step down by one so a single probe can run.
        if self
            .failures
            .compare_exchange(failures, failures - 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(
                failures = failures - 1,
                "database circuit half-open, allowing a probe"
            );
        }
        false
    }

    /// Count one failed database operation.
    ///
    /// The counter saturates at the threshold so a half-open step always
    /// lands exactly one below it.
    pub fn record_failure(&self) {
        let threshold = self.threshold;
        let previous = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_add(1).min(threshold))
            })
            .unwrap_or_else(|c| c);
        self.last_failure
            .store(self.elapsed_ms().saturating_add(1), Ordering::Release);

        if previous + 1 >= threshold && !self.alerted.swap(true, Ordering::AcqRel) {
            error!(
                failures = previous + 1,
                threshold,
                recovery_secs = self.recovery.as_secs(),
                "database circuit opened, skipping database work until it recovers"
            );
        }
    }

    /// Fully close the breaker after any successful database operation.
    pub fn reset_failures(&self) {
        self.failures.store(0, Ordering::Release);
        self.last_failure.store(0, Ordering::Release);
        if self.alerted.swap(false, Ordering::AcqRel) {
            info!("database reachable again, circuit closed");
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            failures: self.failure_count(),
            threshold: self.threshold,
            since_last_failure_ms: self.since_last_failure().map(|d| d.as_millis() as u64),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn since_last_failure(&self) -> Option<Duration> {
        match self.last_failure.load(Ordering::Acquire) {
            0 => None,
            stamp => Some(Duration::from_millis(
                self.elapsed_ms().saturating_sub(stamp - 1),
            )),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}
