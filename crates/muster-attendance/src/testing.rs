//! In-memory stores shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use muster_core::types::{
    AttendanceRecord, Event, EventId, NoResponseRecord, PilotProfile, PublishedEvent,
    ResponseKind, Squadron, SquadronAssignment, SubjectId,
};
use muster_health::RetryPolicy;
use muster_store::{AttendanceStore, ClaimStore, EventStore, StoreError};

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        jitter: Duration::ZERO,
    }
}

pub fn record(id: &str, name: &str, kind: ResponseKind, at: DateTime<Utc>) -> AttendanceRecord {
    AttendanceRecord {
        subject_id: SubjectId::from(id),
        display_name: name.to_string(),
        kind,
        responded_at: at,
    }
}

pub fn sample_event(id: &str) -> Event {
    let start = Utc::now() + chrono::Duration::hours(2);
    Event {
        id: EventId::from(id),
        title: "CASE I recovery practice".into(),
        description: "Bring your own tanker.".into(),
        start_time: start,
        end_time: start + chrono::Duration::hours(2),
        creator: None,
        image_url: None,
        timezone: None,
        track_no_response: false,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Connectivity,
    Logic,
}

impl Fault {
    fn error(self) -> StoreError {
        match self {
            Fault::Connectivity => StoreError::Unavailable("connection refused".into()),
            Fault::Logic => StoreError::Query("no such column: callsign".into()),
        }
    }
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    rows: Vec<AttendanceRecord>,
    no_response: Vec<NoResponseRecord>,
    pilots: Vec<PilotProfile>,
    assignments: Vec<SquadronAssignment>,
    squadrons: Vec<Squadron>,
    responses_fault: Option<Fault>,
    profiles_fault: Option<Fault>,
    no_response_fault: Option<Fault>,
    write_fault: Option<Fault>,
}

#[derive(Default)]
pub struct FakeAttendance {
    state: Mutex<State>,
    pub response_calls: AtomicU32,
    pub profile_calls: AtomicU32,
    pub assignment_calls: AtomicU32,
    pub write_calls: AtomicU32,
}

impl FakeAttendance {
    pub fn with_rows(rows: Vec<AttendanceRecord>) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().rows = rows;
        fake
    }

    pub fn add_event(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }

    pub fn add_pilot(&self, id: &str, callsign: &str, board: Option<&str>) {
        self.state.lock().unwrap().pilots.push(PilotProfile {
            subject_id: SubjectId::from(id),
            callsign: callsign.to_string(),
            board_number: board.map(str::to_string),
        });
    }

    pub fn add_assignment(&self, id: &str, squadron_id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.assignments.push(SquadronAssignment {
            subject_id: SubjectId::from(id),
            squadron_id: squadron_id.to_string(),
        });
        state.squadrons.push(Squadron {
            id: squadron_id.to_string(),
            name: name.to_string(),
            designation: None,
        });
    }

    pub fn add_no_response(&self, id: &str, name: &str) {
        self.state.lock().unwrap().no_response.push(NoResponseRecord {
            subject_id: SubjectId::from(id),
            display_name: name.to_string(),
        });
    }

    pub fn fail_responses(&self, fault: Fault) {
        self.state.lock().unwrap().responses_fault = Some(fault);
    }

    pub fn fail_profiles(&self, fault: Fault) {
        self.state.lock().unwrap().profiles_fault = Some(fault);
    }

    pub fn fail_no_response(&self, fault: Fault) {
        self.state.lock().unwrap().no_response_fault = Some(fault);
    }

    pub fn fail_writes(&self, fault: Fault) {
        self.state.lock().unwrap().write_fault = Some(fault);
    }

    pub fn rows(&self) -> Vec<AttendanceRecord> {
        self.state.lock().unwrap().rows.clone()
    }
}

#[async_trait]
impl EventStore for FakeAttendance {
    async fn ping(&self) -> muster_store::Result<()> {
        Ok(())
    }

    async fn event(&self, id: &EventId) -> muster_store::Result<Option<Event>> {
        let state = self.state.lock().unwrap();
        Ok(state.events.iter().find(|e| &e.id == id).cloned())
    }

    async fn events_ending_after(
        &self,
        _cutoff: DateTime<Utc>,
    ) -> muster_store::Result<Vec<PublishedEvent>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl AttendanceStore for FakeAttendance {
    async fn latest_responses(
        &self,
        _event_id: &EventId,
    ) -> muster_store::Result<Vec<AttendanceRecord>> {
        self.response_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        match state.responses_fault {
            Some(f) => Err(f.error()),
            None => Ok(state.rows.clone()),
        }
    }

    async fn no_response_users(
        &self,
        _event_id: &EventId,
    ) -> muster_store::Result<Vec<NoResponseRecord>> {
        let state = self.state.lock().unwrap();
        match state.no_response_fault {
            Some(f) => Err(f.error()),
            None => Ok(state.no_response.clone()),
        }
    }

    async fn profiles(&self, ids: &[SubjectId]) -> muster_store::Result<Vec<PilotProfile>> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if let Some(f) = state.profiles_fault {
            return Err(f.error());
        }
        Ok(state
            .pilots
            .iter()
            .filter(|p| ids.contains(&p.subject_id))
            .cloned()
            .collect())
    }

    async fn active_assignments(
        &self,
        ids: &[SubjectId],
    ) -> muster_store::Result<Vec<SquadronAssignment>> {
        self.assignment_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| ids.contains(&a.subject_id))
            .cloned()
            .collect())
    }

    async fn squadrons(&self, squadron_ids: &[String]) -> muster_store::Result<Vec<Squadron>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .squadrons
            .iter()
            .filter(|s| squadron_ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn record_response(
        &self,
        _event_id: &EventId,
        record: &AttendanceRecord,
    ) -> muster_store::Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(f) = state.write_fault {
            return Err(f.error());
        }
        state.rows.retain(|r| r.subject_id != record.subject_id);
        state.rows.push(record.clone());
        Ok(())
    }
}

/// Claim store that can be switched into a failing mode.
#[derive(Default)]
pub struct FakeClaims {
    claims: Mutex<HashMap<String, DateTime<Utc>>>,
    fault: Mutex<Option<Fault>>,
    pub purges: AtomicU32,
}

impl FakeClaims {
    pub fn fail(&self, fault: Fault) {
        *self.fault.lock().unwrap() = Some(fault);
    }

    pub fn len(&self) -> usize {
        self.claims.lock().unwrap().len()
    }
}

#[async_trait]
impl ClaimStore for FakeClaims {
    async fn insert_claim(
        &self,
        interaction_id: &str,
        expires_at: DateTime<Utc>,
    ) -> muster_store::Result<()> {
        if let Some(f) = *self.fault.lock().unwrap() {
            return Err(f.error());
        }
        let mut claims = self.claims.lock().unwrap();
        if claims.contains_key(interaction_id) {
            return Err(StoreError::Constraint(format!(
                "UNIQUE constraint failed: interaction_claims.interaction_id ({interaction_id})"
            )));
        }
        claims.insert(interaction_id.to_string(), expires_at);
        Ok(())
    }

    async fn purge_expired_claims(&self, now: DateTime<Utc>) -> muster_store::Result<usize> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = *self.fault.lock().unwrap() {
            return Err(f.error());
        }
        let mut claims = self.claims.lock().unwrap();
        let before = claims.len();
        claims.retain(|_, expires| *expires > now);
        Ok(before - claims.len())
    }
}
