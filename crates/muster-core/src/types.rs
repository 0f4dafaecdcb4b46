use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a scheduled event (UUID string, assigned by the publisher).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Discord user id of a responder, kept as a string so it round-trips through SQLite untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Location of a published event message on Discord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.guild_id, self.channel_id, self.message_id)
    }
}

/// Who created the event, shown in the embed footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    pub board_number: Option<String>,
}

/// An event as stored by the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub creator: Option<Creator>,
    pub image_url: Option<String>,
    /// IANA zone the organiser published the event in.
    pub timezone: Option<String>,
    /// Whether the roster should list guild members who have not answered.
    #[serde(default)]
    pub track_no_response: bool,
}

impl Event {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// An event together with one of the messages it was published to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub event: Event,
    pub message: MessageRef,
}

/// Attendance answer recorded for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Accepted,
    Declined,
    Tentative,
    /// Marked present during a roll call; counts as an accept.
    RollCall,
}

impl ResponseKind {
    /// Whether the answer lands in the accepted bucket.
    pub fn is_attending(&self) -> bool {
        matches!(self, ResponseKind::Accepted | ResponseKind::RollCall)
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseKind::Accepted => "accepted",
            ResponseKind::Declined => "declined",
            ResponseKind::Tentative => "tentative",
            ResponseKind::RollCall => "roll_call",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ResponseKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(ResponseKind::Accepted),
            "declined" => Ok(ResponseKind::Declined),
            "tentative" => Ok(ResponseKind::Tentative),
            "roll_call" => Ok(ResponseKind::RollCall),
            other => Err(format!("unknown response kind: {other}")),
        }
    }
}

/// Raw attendance row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub subject_id: SubjectId,
    /// Name the subject had on Discord when they answered.
    pub display_name: String,
    pub kind: ResponseKind,
    pub responded_at: DateTime<Utc>,
}

/// A guild member who has not answered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoResponseRecord {
    pub subject_id: SubjectId,
    pub display_name: String,
}

/// Pilot profile linked to a Discord account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotProfile {
    pub subject_id: SubjectId,
    pub callsign: String,
    pub board_number: Option<String>,
}

/// Currently active squadron membership of a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadronAssignment {
    pub subject_id: SubjectId,
    pub squadron_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squadron {
    pub id: String,
    pub name: String,
    pub designation: Option<String>,
}

/// One line of the rendered roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub subject_id: SubjectId,
    pub display_name: String,
    /// Board number, when the subject has a pilot profile.
    pub board_number: Option<String>,
    pub squadron: Option<Squadron>,
}

impl RosterEntry {
    /// Entry for a subject with no enrichment at all.
    pub fn fallback(subject_id: SubjectId, display_name: &str) -> Self {
        Self {
            subject_id,
            display_name: display_name.to_string(),
            board_number: None,
            squadron: None,
        }
    }
}

/// Categorised roster, rebuilt from scratch on every reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBuckets {
    pub accepted: Vec<RosterEntry>,
    pub declined: Vec<RosterEntry>,
    pub tentative: Vec<RosterEntry>,
    pub no_response: Vec<RosterEntry>,
}
