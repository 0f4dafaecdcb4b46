use async_trait::async_trait;
use chrono::{DateTime, Utc};

use muster_core::types::{
    AttendanceRecord, Event, EventId, NoResponseRecord, PilotProfile, PublishedEvent, Squadron,
    SquadronAssignment, SubjectId,
};

use crate::error::Result;

/// Read access to published events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Cheap round trip used as a health probe.
    async fn ping(&self) -> Result<()>;

    async fn event(&self, id: &EventId) -> Result<Option<Event>>;

    /// Every (event, message) publication whose event ends after `cutoff`.
    async fn events_ending_after(&self, cutoff: DateTime<Utc>) -> Result<Vec<PublishedEvent>>;
}

/// Attendance rows plus the batched lookups used to enrich them.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Latest answer per subject for the event.
    async fn latest_responses(&self, event_id: &EventId) -> Result<Vec<AttendanceRecord>>;

    /// Guild members of the event's guilds who have not answered.
    async fn no_response_users(&self, event_id: &EventId) -> Result<Vec<NoResponseRecord>>;

    async fn profiles(&self, ids: &[SubjectId]) -> Result<Vec<PilotProfile>>;

    async fn active_assignments(&self, ids: &[SubjectId]) -> Result<Vec<SquadronAssignment>>;

    async fn squadrons(&self, squadron_ids: &[String]) -> Result<Vec<Squadron>>;

    /// Insert or replace the subject's answer for the event.
    async fn record_response(&self, event_id: &EventId, record: &AttendanceRecord) -> Result<()>;
}

/// Durable, cross-instance interaction claims.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Insert a claim. Fails with [`crate::StoreError::Constraint`] when the id
    /// was already claimed by this or another process.
    async fn insert_claim(&self, interaction_id: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Delete claims that expired before `now`. Returns the number removed.
    async fn purge_expired_claims(&self, now: DateTime<Utc>) -> Result<usize>;
}
