//! Write path behind the accept / decline / tentative buttons.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use muster_core::types::{
    AttendanceRecord, Event, EventId, ResponseBuckets, ResponseKind, SubjectId,
};
use muster_health::{CircuitBreaker, RetryPolicy};
use muster_store::{AttendanceStore, EventStore};

use crate::error::RespondError;
use crate::reconcile::Reconciler;

/// Fresh state to render after a response was stored.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub event: Event,
    pub buckets: ResponseBuckets,
}

pub struct ResponseRecorder {
    events: Arc<dyn EventStore>,
    store: Arc<dyn AttendanceStore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    reconciler: Arc<Reconciler>,
}

impl ResponseRecorder {
    pub fn new(
        events: Arc<dyn EventStore>,
        store: Arc<dyn AttendanceStore>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            events,
            store,
            breaker,
            retry,
            reconciler,
        }
    }

    /// Store `subject`'s answer and rebuild the roster from the database.
    ///
    /// Nothing is written while the circuit is open, and the caller gets no
    /// buckets unless the full reconciliation succeeded.
    pub async fn respond(
        &self,
        event_id: &EventId,
        subject_id: SubjectId,
        display_name: &str,
        kind: ResponseKind,
    ) -> Result<RecordedResponse, RespondError> {
        if self.breaker.is_open() {
            return Err(RespondError::CircuitOpen);
        }

        let event = self
            .retry
            .with_retry(&self.breaker, "event", || self.events.event(event_id))
            .await
            .map_err(RespondError::EventLookup)?
            .ok_or_else(|| RespondError::UnknownEvent(event_id.clone()))?;

        let record = AttendanceRecord {
            subject_id,
            display_name: display_name.to_string(),
            kind,
            responded_at: Utc::now(),
        };
        self.retry
            .with_retry(&self.breaker, "record_response", || {
                self.store.record_response(event_id, &record)
            })
            .await
            .map_err(RespondError::Write)?;
        info!(
            event_id = %event_id,
            subject_id = %record.subject_id,
            kind = %kind,
            "response recorded"
        );

        let buckets = self
            .reconciler
            .reconcile(event_id, event.track_no_response)
            .await?;
        Ok(RecordedResponse { event, buckets })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use muster_store::SqliteStore;

    use super::*;
    use crate::testing::{fast_retry, sample_event, FakeAttendance, Fault};

    fn recorder(store: Arc<FakeAttendance>, breaker: Arc<CircuitBreaker>) -> ResponseRecorder {
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::clone(&breaker),
            fast_retry(),
        ));
        ResponseRecorder::new(store.clone(), store, breaker, fast_retry(), reconciler)
    }

    async fn answer(
        r: &ResponseRecorder,
        event: &str,
        name: &str,
        kind: ResponseKind,
    ) -> Result<RecordedResponse, RespondError> {
        let subject = SubjectId::from(format!("id-{name}"));
        r.respond(&EventId::from(event), subject, name, kind).await
    }

    #[tokio::test(start_paused = true)]
    async fn stores_answer_and_returns_fresh_buckets() {
        let store = Arc::new(FakeAttendance::default());
        store.add_event(sample_event("e1"));
        let r = recorder(Arc::clone(&store), Arc::new(CircuitBreaker::default()));

        answer(&r, "e1", "Goose", ResponseKind::Tentative).await.unwrap();
        let out = answer(&r, "e1", "Goose", ResponseKind::Accepted).await.unwrap();

        assert_eq!(out.event.id, EventId::from("e1"));
        assert_eq!(out.buckets.accepted.len(), 1);
        assert!(out.buckets.tentative.is_empty());
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_rejects_without_writing() {
        let store = Arc::new(FakeAttendance::default());
        store.add_event(sample_event("e1"));
        let breaker = Arc::new(CircuitBreaker::default());
        for _ in 0..breaker.threshold() {
            breaker.record_failure();
        }
        let r = recorder(Arc::clone(&store), breaker);

        let err = answer(&r, "e1", "Goose", ResponseKind::Accepted).await.unwrap_err();
        assert!(matches!(err, RespondError::CircuitOpen));
        assert_eq!(store.write_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_event_is_rejected() {
        let store = Arc::new(FakeAttendance::default());
        let r = recorder(Arc::clone(&store), Arc::new(CircuitBreaker::default()));
        let err = answer(&r, "nope", "Goose", ResponseKind::Accepted).await.unwrap_err();
        assert!(matches!(err, RespondError::UnknownEvent(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_retried_then_reported() {
        let store = Arc::new(FakeAttendance::default());
        store.add_event(sample_event("e1"));
        store.fail_writes(Fault::Connectivity);
        let r = recorder(Arc::clone(&store), Arc::new(CircuitBreaker::default()));

        let err = answer(&r, "e1", "Goose", ResponseKind::Declined).await.unwrap_err();
        assert!(matches!(err, RespondError::Write(ref e) if e.is_exhausted()));
        assert_eq!(store.write_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn works_against_sqlite() {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        db.save_event(&sample_event("e1")).unwrap();
        let breaker = Arc::new(CircuitBreaker::default());
        let reconciler = Arc::new(Reconciler::new(db.clone(), breaker.clone(), fast_retry()));
        let r = ResponseRecorder::new(db.clone(), db, breaker, fast_retry(), reconciler);

        let out = answer(&r, "e1", "Iceman", ResponseKind::RollCall).await.unwrap();
        assert_eq!(out.buckets.accepted[0].display_name, "Iceman");
    }
}
