//! Attendance reconciliation.
//!
//! Buckets are rebuilt from scratch on every call and never patched in
//! place, so two bot instances looking at the same rows always agree.
//!
//! Fail-closed: if the response rows, or any enrichment lookup, fail with a
//! connectivity error the whole pass fails and the caller must not render.
//! The no-response list is cosmetic and degrades to empty on its own.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use muster_core::types::{
    AttendanceRecord, EventId, PilotProfile, ResponseBuckets, ResponseKind, RosterEntry, Squadron,
    SubjectId,
};
use muster_health::{CircuitBreaker, RetryError, RetryPolicy};
use muster_store::{AttendanceStore, StoreError};

use crate::error::ReconcileError;

/// Rebuilds [`ResponseBuckets`] for an event.
pub struct Reconciler {
    store: Arc<dyn AttendanceStore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            breaker,
            retry,
        }
    }

    pub async fn reconcile(
        &self,
        event_id: &EventId,
        include_no_response: bool,
    ) -> Result<ResponseBuckets, ReconcileError> {
        if self.breaker.is_open() {
            return Err(ReconcileError::CircuitOpen);
        }

        let rows = self
            .retry
            .with_retry(&self.breaker, "latest_responses", || {
                self.store.latest_responses(event_id)
            })
            .await
            .map_err(ReconcileError::Responses)?;
        let rows = latest_per_subject(rows);
        let ids: Vec<SubjectId> = rows.iter().map(|r| r.subject_id.clone()).collect();

        // One round trip per table, independent of roster size.
        let (profiles, assignments) = tokio::join!(
            self.enrichment("pilots", || self.store.profiles(&ids)),
            self.enrichment("squadron_assignments", || self
                .store
                .active_assignments(&ids)),
        );
        let (profiles, assignments) = (profiles?, assignments?);

        let mut squadron_ids: Vec<String> =
            assignments.iter().map(|a| a.squadron_id.clone()).collect();
        squadron_ids.sort();
        squadron_ids.dedup();
        let squadrons = self
            .enrichment("squadrons", || self.store.squadrons(&squadron_ids))
            .await?;

        let profiles: HashMap<&SubjectId, &PilotProfile> =
            profiles.iter().map(|p| (&p.subject_id, p)).collect();
        let squadrons: HashMap<&str, &Squadron> =
            squadrons.iter().map(|s| (s.id.as_str(), s)).collect();
        let squadron_of: HashMap<&SubjectId, &Squadron> = assignments
            .iter()
            .filter_map(|a| {
                squadrons
                    .get(a.squadron_id.as_str())
                    .map(|s| (&a.subject_id, *s))
            })
            .collect();

        let mut buckets = ResponseBuckets::default();
        for row in &rows {
            let entry = roster_entry(row, &profiles, &squadron_of);
            match row.kind {
                ResponseKind::Accepted | ResponseKind::RollCall => buckets.accepted.push(entry),
                ResponseKind::Declined => buckets.declined.push(entry),
                ResponseKind::Tentative => buckets.tentative.push(entry),
            }
        }

        if include_no_response {
            buckets.no_response = self.no_response(event_id, &ids).await;
        }

        debug!(
            event_id = %event_id,
            accepted = buckets.accepted.len(),
            declined = buckets.declined.len(),
            tentative = buckets.tentative.len(),
            no_response = buckets.no_response.len(),
            "roster reconciled"
        );
        Ok(buckets)
    }

    /// Run one enrichment lookup. Connectivity failures abort the pass;
    /// logic errors fall back to the raw display names.
    async fn enrichment<T, F, Fut>(
        &self,
        table: &'static str,
        op: F,
    ) -> Result<Vec<T>, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<T>, StoreError>>,
    {
        match self.retry.with_retry(&self.breaker, table, op).await {
            Ok(rows) => Ok(rows),
            Err(cause @ RetryError::Exhausted { .. }) => {
                Err(ReconcileError::Enrichment { table, cause })
            }
            Err(RetryError::Fatal(e)) => {
                warn!(table, error = %e, "enrichment lookup failed, using raw names");
                Ok(Vec::new())
            }
        }
    }

    async fn no_response(&self, event_id: &EventId, responded: &[SubjectId]) -> Vec<RosterEntry> {
        let responded: HashSet<&SubjectId> = responded.iter().collect();
        match self
            .retry
            .with_retry(&self.breaker, "no_response_users", || {
                self.store.no_response_users(event_id)
            })
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .filter(|r| !responded.contains(&r.subject_id))
                .map(|r| RosterEntry::fallback(r.subject_id, &r.display_name))
                .collect(),
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "no-response lookup failed, showing none");
                Vec::new()
            }
        }
    }
}

/// Keep only the newest row per subject, ordered by response time.
fn latest_per_subject(rows: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    let mut latest: HashMap<SubjectId, AttendanceRecord> = HashMap::with_capacity(rows.len());
    for row in rows {
        match latest.get(&row.subject_id) {
            Some(existing) if existing.responded_at > row.responded_at => {}
            _ => {
                latest.insert(row.subject_id.clone(), row);
            }
        }
    }
    let mut rows: Vec<AttendanceRecord> = latest.into_values().collect();
    rows.sort_by(|a, b| {
        a.responded_at
            .cmp(&b.responded_at)
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });
    rows
}

fn roster_entry(
    row: &AttendanceRecord,
    profiles: &HashMap<&SubjectId, &PilotProfile>,
    squadron_of: &HashMap<&SubjectId, &Squadron>,
) -> RosterEntry {
    let squadron = squadron_of.get(&row.subject_id).map(|s| (*s).clone());
    match profiles.get(&row.subject_id) {
        Some(profile) => RosterEntry {
            subject_id: row.subject_id.clone(),
            display_name: profile.callsign.clone(),
            board_number: profile.board_number.clone(),
            squadron,
        },
        None => RosterEntry {
            squadron,
            ..RosterEntry::fallback(row.subject_id.clone(), &row.display_name)
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::testing::{fast_retry, record, FakeAttendance, Fault};

    fn reconciler(store: Arc<FakeAttendance>) -> (Reconciler, Arc<CircuitBreaker>) {
        let breaker = Arc::new(CircuitBreaker::default());
        (
            Reconciler::new(store, Arc::clone(&breaker), fast_retry()),
            breaker,
        )
    }

    fn names(entries: &[RosterEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.display_name.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn roll_call_counts_as_accepted() {
        let t = Utc::now();
        let store = Arc::new(FakeAttendance::with_rows(vec![
            record("a", "A", ResponseKind::Accepted, t),
            record("b", "B", ResponseKind::Declined, t + Duration::seconds(1)),
            record("c", "C", ResponseKind::RollCall, t + Duration::seconds(2)),
        ]));
        let (r, _) = reconciler(store);

        let buckets = r.reconcile(&EventId::from("e1"), false).await.unwrap();
        assert_eq!(names(&buckets.accepted), vec!["A", "C"]);
        assert_eq!(names(&buckets.declined), vec!["B"]);
        assert!(buckets.tentative.is_empty());
        assert!(buckets.no_response.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn latest_row_per_subject_wins() {
        let t = Utc::now();
        let store = Arc::new(FakeAttendance::with_rows(vec![
            record("a", "A", ResponseKind::Declined, t + Duration::seconds(10)),
            record("a", "A", ResponseKind::Accepted, t),
        ]));
        let (r, _) = reconciler(store);

        let buckets = r.reconcile(&EventId::from("e1"), false).await.unwrap();
        assert!(buckets.accepted.is_empty());
        assert_eq!(names(&buckets.declined), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn enrichment_replaces_raw_names() {
        let store = Arc::new(FakeAttendance::with_rows(vec![
            record("a", "discord-a", ResponseKind::Accepted, Utc::now()),
            record("b", "discord-b", ResponseKind::Tentative, Utc::now()),
        ]));
        store.add_pilot("a", "Maverick", Some("104"));
        store.add_assignment("a", "vf-1", "Wolfpack");
        let (r, _) = reconciler(Arc::clone(&store));

        let buckets = r.reconcile(&EventId::from("e1"), false).await.unwrap();
        let a = &buckets.accepted[0];
        assert_eq!(a.display_name, "Maverick");
        assert_eq!(a.board_number.as_deref(), Some("104"));
        assert_eq!(a.squadron.as_ref().map(|s| s.name.as_str()), Some("Wolfpack"));
        assert_eq!(buckets.tentative[0].display_name, "discord-b");
        // Exactly one batched call per table.
        assert_eq!(store.profile_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.assignment_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_failure_in_enrichment_fails_the_pass() {
        let store = Arc::new(FakeAttendance::with_rows(vec![record(
            "a",
            "A",
            ResponseKind::Accepted,
            Utc::now(),
        )]));
        store.fail_profiles(Fault::Connectivity);
        let (r, breaker) = reconciler(store);

        let err = r.reconcile(&EventId::from("e1"), false).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Enrichment { table: "pilots", .. }));
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logic_failure_in_enrichment_degrades_to_raw_names() {
        let store = Arc::new(FakeAttendance::with_rows(vec![record(
            "a",
            "raw-a",
            ResponseKind::Accepted,
            Utc::now(),
        )]));
        store.add_pilot("a", "Maverick", None);
        store.fail_profiles(Fault::Logic);
        let (r, _) = reconciler(store);

        let buckets = r.reconcile(&EventId::from("e1"), false).await.unwrap();
        assert_eq!(names(&buckets.accepted), vec!["raw-a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn response_fetch_failure_fails_the_pass() {
        let store = Arc::new(FakeAttendance::default());
        store.fail_responses(Fault::Connectivity);
        let (r, _) = reconciler(store);
        let err = r.reconcile(&EventId::from("e1"), true).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Responses(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_skips_the_database() {
        let store = Arc::new(FakeAttendance::default());
        let (r, breaker) = reconciler(Arc::clone(&store));
        for _ in 0..breaker.threshold() {
            breaker.record_failure();
        }
        let err = r.reconcile(&EventId::from("e1"), false).await.unwrap_err();
        assert!(matches!(err, ReconcileError::CircuitOpen));
        assert_eq!(store.response_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_response_only_when_requested_and_tolerates_failure() {
        let store = Arc::new(FakeAttendance::with_rows(vec![record(
            "a",
            "A",
            ResponseKind::Accepted,
            Utc::now(),
        )]));
        store.add_no_response("z", "Zulu");
        let (r, _) = reconciler(Arc::clone(&store));

        let without = r.reconcile(&EventId::from("e1"), false).await.unwrap();
        assert!(without.no_response.is_empty());
        let with = r.reconcile(&EventId::from("e1"), true).await.unwrap();
        assert_eq!(names(&with.no_response), vec!["Zulu"]);

        store.fail_no_response(Fault::Connectivity);
        let degraded = r.reconcile(&EventId::from("e1"), true).await.unwrap();
        assert!(degraded.no_response.is_empty());
        assert_eq!(names(&degraded.accepted), vec!["A"]);
    }
}
