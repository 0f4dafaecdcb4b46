//! Per-message countdown timers.
//!
//! Every scheduled message owns one tokio task holding a [`CancellationToken`].
//! The task sleeps for the planned delay, fires, and loops, so firings for a
//! single message never overlap. Scheduling a message again cancels the old
//! task first. A firing that finishes after its token was cancelled is
//! discarded and never reschedules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use muster_attendance::Reconciler;
use muster_core::config::CountdownConfig;
use muster_core::render::{RenderRequest, Renderer};
use muster_core::types::{Event, MessageRef};
use muster_health::{CircuitBreaker, RetryPolicy};
use muster_store::EventStore;

use crate::clock::Clock;
use crate::error::{CountdownError, Result};
use crate::interval::{plan_next, Plan};
use crate::ports::MessageStore;

/// Pause before retrying a final edit that could not be applied. Retries stop
/// once the event ended longer ago than the lookback window.
const FINAL_RETRY: Duration = Duration::from_secs(60);

/// Collaborators shared by every timer.
pub struct SchedulerDeps {
    pub events: Arc<dyn EventStore>,
    pub reconciler: Arc<Reconciler>,
    pub renderer: Arc<dyn Renderer>,
    pub messages: Arc<dyn MessageStore>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: RetryPolicy,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct CountdownOptions {
    /// How far back `start()` looks for events that already ended.
    pub lookback: chrono::Duration,
    /// Cadence of the publication resync; `None` disables it.
    pub resync_interval: Option<Duration>,
    pub default_timezone: String,
}

impl Default for CountdownOptions {
    fn default() -> Self {
        Self::from_config(&CountdownConfig::default())
    }
}

impl CountdownOptions {
    pub fn from_config(config: &CountdownConfig) -> Self {
        Self {
            lookback: chrono::Duration::hours(config.lookback_hours.max(0)),
            resync_interval: (config.resync_interval_secs > 0)
                .then(|| Duration::from_secs(config.resync_interval_secs)),
            default_timezone: config.default_timezone.clone(),
        }
    }
}

struct Timer {
    token: CancellationToken,
    generation: u64,
}

/// Result of one firing that did not fail.
enum Fired {
    Updated { finished: bool },
    Skipped { finished: bool },
    Gone,
}

struct Inner {
    deps: SchedulerDeps,
    options: CountdownOptions,
    timers: DashMap<u64, Timer>,
    /// Messages whose finished state was applied by this process.
    finalized: DashSet<u64>,
    running: AtomicBool,
    next_generation: AtomicU64,
    resync: Mutex<Option<CancellationToken>>,
}

/// Handle to the countdown scheduler. Cheap to clone.
#[derive(Clone)]
pub struct CountdownScheduler {
    inner: Arc<Inner>,
}

impl CountdownScheduler {
    pub fn new(deps: SchedulerDeps, options: CountdownOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                options,
                timers: DashMap::new(),
                finalized: DashSet::new(),
                running: AtomicBool::new(false),
                next_generation: AtomicU64::new(1),
                resync: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_scheduled(&self, message_id: u64) -> bool {
        self.inner.timers.contains_key(&message_id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.timers.len()
    }

    /// Probe the database, then schedule every publication whose event has
    /// not ended or ended within the lookback window.
    ///
    /// The scheduler counts as running even when the probe fails; the resync
    /// task (and `add_event_to_schedule`) pick up the work once the database
    /// is back. Returns the number of messages scheduled.
    pub async fn start(&self) -> Result<usize> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("countdown scheduler already running");
            return Ok(0);
        }
        info!("countdown scheduler starting");
        self.spawn_resync();

        let inner = &self.inner;
        if inner.deps.breaker.is_open() {
            warn!("database circuit open, deferring countdown load");
            return Err(CountdownError::CircuitOpen);
        }
        inner
            .deps
            .retry
            .with_retry(&inner.deps.breaker, "ping", || inner.deps.events.ping())
            .await
            .map_err(CountdownError::Store)?;

        let scheduled = self.sync().await?;
        info!(scheduled, "countdown scheduler started");
        Ok(scheduled)
    }

    /// Cancel every timer and the resync task.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(token) = self.inner.resync_slot().take() {
            token.cancel();
        }
        let count = self.inner.timers.len();
        self.inner.timers.retain(|_, timer| {
            timer.token.cancel();
            false
        });
        info!(cancelled = count, "countdown scheduler stopped");
    }

    /// Start (or restart) the countdown for one published message.
    ///
    /// An event that already ended gets one immediate final edit and no
    /// timer.
    pub async fn schedule(&self, event: Event, message: MessageRef, timezone: Option<String>) {
        let message_id = message.message_id;
        self.cancel(message_id);

        let timezone = timezone
            .or_else(|| event.timezone.clone())
            .unwrap_or_else(|| self.inner.options.default_timezone.clone());

        let now = self.inner.deps.clock.now();
        if event.has_ended(now) {
            debug!(message_id, event_id = %event.id, "event already ended, applying final state");
            match self.inner.refresh(&event, &message, &timezone, true).await {
                Ok(()) => {
                    self.inner.finalized.insert(message_id);
                    info!(message_id, event_id = %event.id, "event finalized");
                }
                Err(e) if e.is_not_found() => {
                    self.inner.finalized.insert(message_id);
                    info!(message_id, "message deleted, nothing to finalize");
                }
                Err(e) => {
                    warn!(message_id, event_id = %event.id, error = %e, "final update skipped");
                }
            }
            return;
        }

        self.inner.finalized.remove(&message_id);
        let token = CancellationToken::new();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = Timer {
            token: token.clone(),
            generation,
        };
        // A concurrent `schedule` for the same message may have won the race.
        if let Some(previous) = self.inner.timers.insert(message_id, timer) {
            previous.token.cancel();
        }
        debug!(message_id, event_id = %event.id, "countdown scheduled");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .run_timer(event, message, timezone, token, generation)
                .await;
        });
    }

    /// Stop refreshing one message. Safe while a firing is in flight.
    pub fn cancel(&self, message_id: u64) -> bool {
        match self.inner.timers.remove(&message_id) {
            Some((_, timer)) => {
                timer.token.cancel();
                debug!(message_id, "countdown cancelled");
                true
            }
            None => false,
        }
    }

    /// Schedule a newly published message. Ignored unless the scheduler has
    /// been started.
    pub async fn add_event_to_schedule(&self, event: Event, message: MessageRef) -> bool {
        if !self.is_running() {
            debug!(
                message_id = message.message_id,
                "scheduler not running, ignoring new event"
            );
            return false;
        }
        self.schedule(event, message, None).await;
        true
    }

    /// Schedule every publication not already scheduled or finalized here.
    async fn sync(&self) -> Result<usize> {
        let inner = &self.inner;
        if inner.deps.breaker.is_open() {
            return Err(CountdownError::CircuitOpen);
        }
        let cutoff = inner.deps.clock.now() - inner.options.lookback;
        let published = inner
            .deps
            .retry
            .with_retry(&inner.deps.breaker, "events_ending_after", || {
                inner.deps.events.events_ending_after(cutoff)
            })
            .await
            .map_err(CountdownError::Store)?;

        let mut scheduled = 0;
        for publication in published {
            if !self.is_running() {
                debug!("scheduler stopped during sync");
                break;
            }
            let message_id = publication.message.message_id;
            if self.is_scheduled(message_id) || inner.finalized.contains(&message_id) {
                continue;
            }
            let timezone = publication.event.timezone.clone();
            self.schedule(publication.event, publication.message, timezone).await;
            // `stop()` may have run while the final edit above was in flight.
            if !self.is_running() {
                self.cancel(message_id);
                break;
            }
            scheduled += 1;
        }
        Ok(scheduled)
    }

    fn spawn_resync(&self) {
        let Some(every) = self.inner.options.resync_interval else {
            return;
        };
        let token = CancellationToken::new();
        if let Some(previous) = self.inner.resync_slot().replace(token.clone()) {
            previous.cancel();
        }

        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match this.sync().await {
                            Ok(0) => {}
                            Ok(n) => info!(scheduled = n, "resync picked up new events"),
                            Err(e) => warn!(error = %e, "countdown resync failed"),
                        }
                    }
                }
            }
            debug!("countdown resync stopped");
        });
    }
}

impl Inner {
    fn resync_slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.resync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_timer(
        self: Arc<Self>,
        mut event: Event,
        message: MessageRef,
        timezone: String,
        token: CancellationToken,
        generation: u64,
    ) {
        let message_id = message.message_id;
        let mut final_pending = false;
        loop {
            let now = self.deps.clock.now();
            let delay = match plan_next(&event, now) {
                Plan::Periodic(delay) | Plan::AtEnd(delay) => delay,
                Plan::Finalize if final_pending => {
                    if now - event.end_time > self.options.lookback {
                        warn!(
                            message_id,
                            event_id = %event.id,
                            "final update kept failing past the lookback window, giving up"
                        );
                        break;
                    }
                    FINAL_RETRY
                }
                Plan::Finalize => Duration::ZERO,
            };
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let fired = self.fire(&mut event, &message, &timezone).await;
            if token.is_cancelled() {
                debug!(message_id, "firing completed after cancellation, discarded");
                return;
            }
            match fired {
                Fired::Updated { finished: true } => {
                    self.finalized.insert(message_id);
                    info!(message_id, event_id = %event.id, "event finalized");
                    break;
                }
                Fired::Updated { finished: false } => final_pending = false,
                Fired::Skipped { finished } => final_pending = finished,
                Fired::Gone => break,
            }
        }
        self.timers.remove_if(&message_id, |_, timer| timer.generation == generation);
    }

    async fn fire(&self, event: &mut Event, message: &MessageRef, timezone: &str) -> Fired {
        let message_id = message.message_id;
        if self.deps.breaker.is_open() {
            warn!(message_id, event_id = %event.id, "database circuit open, refresh skipped");
            return Fired::Skipped {
                finished: event.has_ended(self.deps.clock.now()),
            };
        }

        let events = &self.deps.events;
        let id = event.id.clone();
        match self
            .deps
            .retry
            .with_retry(&self.deps.breaker, "event", || events.event(&id))
            .await
        {
            Ok(Some(fresh)) => *event = fresh,
            Ok(None) => {
                debug!(message_id, event_id = %id, "event row missing, using cached copy");
            }
            Err(e) => {
                warn!(
                    message_id,
                    event_id = %id,
                    error = %e,
                    "event refetch failed, using cached copy"
                );
            }
        }

        let finished = event.has_ended(self.deps.clock.now());
        match self.refresh(event, message, timezone, finished).await {
            Ok(()) => {
                debug!(message_id, finished, "countdown refreshed");
                Fired::Updated { finished }
            }
            Err(e) if e.is_not_found() => {
                info!(message_id, "message deleted, cancelling countdown");
                Fired::Gone
            }
            Err(e) => {
                warn!(message_id, event_id = %event.id, error = %e, "refresh skipped");
                Fired::Skipped { finished }
            }
        }
    }

    /// Reconcile, render and edit. Nothing is rendered unless the
    /// reconciliation fully succeeded.
    async fn refresh(
        &self,
        event: &Event,
        message: &MessageRef,
        timezone: &str,
        finished: bool,
    ) -> Result<()> {
        let buckets = self
            .deps
            .reconciler
            .reconcile(&event.id, event.track_no_response)
            .await?;
        let view = self.deps.renderer.render(&RenderRequest {
            event,
            buckets: &buckets,
            timezone,
            finished,
        });
        self.deps.messages.edit_message(message, &view).await?;
        Ok(())
    }
}
