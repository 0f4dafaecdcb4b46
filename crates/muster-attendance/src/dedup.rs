//! Exactly-once handling of button interactions.
//!
//! A claim goes through two layers:
//!
//! 1. a durable insert keyed by the interaction id. A uniqueness violation
//!    means another instance (or an earlier delivery) owns it, and that
//!    answer is final;
//! 2. a process-local cache with the same TTL, which keeps a single instance
//!    idempotent while the durable store is down or the circuit is open.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use muster_core::config::InteractionsConfig;
use muster_health::CircuitBreaker;
use muster_store::ClaimStore;

pub struct InteractionGuard {
    store: Arc<dyn ClaimStore>,
    breaker: Arc<CircuitBreaker>,
    local: DashMap<String, Instant>,
    ttl: Duration,
}

impl InteractionGuard {
    pub fn new(store: Arc<dyn ClaimStore>, breaker: Arc<CircuitBreaker>, ttl: Duration) -> Self {
        Self {
            store,
            breaker,
            local: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(
        store: Arc<dyn ClaimStore>,
        breaker: Arc<CircuitBreaker>,
        config: &InteractionsConfig,
    ) -> Self {
        Self::new(store, breaker, Duration::from_secs(config.claim_ttl_secs))
    }

    /// Returns `true` if the caller may process this interaction.
    pub async fn claim(&self, interaction_id: &str) -> bool {
        if self.breaker.is_open() {
            debug!(interaction_id, "circuit open, using local dedup only");
        } else {
            let ttl =
                chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::seconds(30));
            match self.store.insert_claim(interaction_id, Utc::now() + ttl).await {
                Ok(()) => {}
                Err(e) if e.is_unique_violation() => {
                    debug!(interaction_id, "interaction already claimed");
                    return false;
                }
                Err(e) => {
                    warn!(interaction_id, error = %e, "durable claim failed, using local dedup");
                }
            }
        }
        self.claim_local(interaction_id)
    }

    fn claim_local(&self, interaction_id: &str) -> bool {
        let now = Instant::now();
        match self.local.entry(interaction_id.to_string()) {
            Entry::Occupied(mut seen) => {
                if now.duration_since(*seen.get()) < self.ttl {
                    debug!(interaction_id, "interaction already seen locally");
                    false
                } else {
                    seen.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Evict expired local entries and purge expired durable claims.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.local.len();
        self.local.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        let evicted = before.saturating_sub(self.local.len());

        if !self.breaker.is_open() {
            match self.store.purge_expired_claims(Utc::now()).await {
                Ok(n) if n > 0 => debug!(purged = n, "expired interaction claims purged"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to purge interaction claims"),
            }
        }
        evicted
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Run [`Self::sweep`] every `every` until `shutdown` flips to `true`.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.sweep().await;
                        if evicted > 0 {
                            debug!(evicted, "local interaction cache swept");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("interaction sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
