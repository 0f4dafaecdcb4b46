use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use muster_core::types::{
    AttendanceRecord, Creator, Event, EventId, MessageRef, NoResponseRecord, PilotProfile,
    PublishedEvent, ResponseKind, Squadron, SquadronAssignment, SubjectId,
};

use crate::db::{init_db, parse_ts, ts};
use crate::error::{Result, StoreError};
use crate::ports::{AttendanceStore, ClaimStore, EventStore};

const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.start_time, e.end_time,
     e.creator_name, e.creator_board_number, e.image_url, e.timezone, e.track_no_response";

/// SQLite-backed implementation of every persistence port.
///
/// Thread-safe: wraps the connection in a Mutex. No lock is ever held
/// across an await point.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    // --- publisher-side writes ---------------------------------------------

    /// Insert or replace an event row.
    pub fn save_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events
             (id, title, description, start_time, end_time, creator_name,
              creator_board_number, image_url, timezone, track_no_response)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(id) DO UPDATE SET
               title=excluded.title, description=excluded.description,
               start_time=excluded.start_time, end_time=excluded.end_time,
               creator_name=excluded.creator_name,
               creator_board_number=excluded.creator_board_number,
               image_url=excluded.image_url, timezone=excluded.timezone,
               track_no_response=excluded.track_no_response",
            params![
                event.id.as_str(),
                event.title,
                event.description,
                ts(event.start_time),
                ts(event.end_time),
                event.creator.as_ref().map(|c| c.name.clone()),
                event.creator.as_ref().and_then(|c| c.board_number.clone()),
                event.image_url,
                event.timezone,
                event.track_no_response,
            ],
        )?;
        Ok(())
    }

    /// Record that `event_id` was published to the Discord message `message`.
    pub fn attach_message(&self, event_id: &EventId, message: MessageRef) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO event_messages (message_id, event_id, guild_id, channel_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message.message_id as i64,
                event_id.as_str(),
                message.guild_id as i64,
                message.channel_id as i64
            ],
        )?;
        Ok(())
    }

    pub fn save_pilot(&self, profile: &PilotProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO pilots (subject_id, callsign, board_number)
             VALUES (?1, ?2, ?3)",
            params![profile.subject_id.as_str(), profile.callsign, profile.board_number],
        )?;
        Ok(())
    }

    pub fn save_squadron(&self, squadron: &Squadron) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO squadrons (id, name, designation) VALUES (?1, ?2, ?3)",
            params![squadron.id, squadron.name, squadron.designation],
        )?;
        Ok(())
    }

    /// End any active assignment of the subject and start a new one.
    pub fn assign_squadron(&self, subject_id: &SubjectId, squadron_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        conn.execute(
            "UPDATE squadron_assignments SET ended_at = ?1
             WHERE subject_id = ?2 AND ended_at IS NULL",
            params![now, subject_id.as_str()],
        )?;
        conn.execute(
            "INSERT INTO squadron_assignments (subject_id, squadron_id, started_at, ended_at)
             VALUES (?1, ?2, ?3, NULL)",
            params![subject_id.as_str(), squadron_id, now],
        )?;
        Ok(())
    }

    pub fn add_roster_member(
        &self,
        guild_id: u64,
        subject_id: &SubjectId,
        display_name: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO roster_members (guild_id, subject_id, display_name)
             VALUES (?1, ?2, ?3)",
            params![guild_id as i64, subject_id.as_str(), display_name],
        )?;
        Ok(())
    }
}

/// `?1, ?2, …, ?n` for a batched `IN (...)` clause.
fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn timestamp(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    parse_ts(raw).ok_or_else(|| StoreError::Corrupt {
        table,
        reason: format!("bad timestamp {raw:?}"),
    })
}

/// Raw `events` columns before timestamp decoding.
type EventRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
);

fn read_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok((
        row.get(0)?, // id
        row.get(1)?, // title
        row.get(2)?, // description
        row.get(3)?, // start_time
        row.get(4)?, // end_time
        row.get(5)?, // creator_name
        row.get(6)?, // creator_board_number
        row.get(7)?, // image_url
        row.get(8)?, // timezone
        row.get(9)?, // track_no_response
    ))
}

fn decode_event(raw: EventRow) -> Result<Event> {
    let (
        id,
        title,
        description,
        start,
        end,
        creator_name,
        creator_board_number,
        image_url,
        timezone,
        track_no_response,
    ) = raw;
    Ok(Event {
        id: EventId(id),
        title,
        description,
        start_time: timestamp("events", &start)?,
        end_time: timestamp("events", &end)?,
        creator: creator_name.map(|name| Creator {
            name,
            board_number: creator_board_number,
        }),
        image_url,
        timezone,
        track_no_response,
    })
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    async fn event(&self, id: &EventId) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?1"),
                [id.as_str()],
                read_event_row,
            )
            .optional()?;
        raw.map(decode_event).transpose()
    }

    async fn events_ending_after(&self, cutoff: DateTime<Utc>) -> Result<Vec<PublishedEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {EVENT_COLUMNS}, m.guild_id, m.channel_id, m.message_id
             FROM events e JOIN event_messages m ON m.event_id = e.id
             WHERE e.end_time > ?1
             ORDER BY e.start_time, m.message_id"
        ))?;
        let rows = stmt
            .query_map([ts(cutoff)], |row| {
                Ok((
                    read_event_row(row)?,
                    row.get::<_, i64>(10)?,
                    row.get::<_, i64>(11)?,
                    row.get::<_, i64>(12)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let published = rows
            .into_iter()
            .map(|(raw, guild_id, channel_id, message_id)| {
                Ok(PublishedEvent {
                    event: decode_event(raw)?,
                    message: MessageRef {
                        guild_id: guild_id as u64,
                        channel_id: channel_id as u64,
                        message_id: message_id as u64,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(count = published.len(), "loaded event publications");
        Ok(published)
    }
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn latest_responses(&self, event_id: &EventId) -> Result<Vec<AttendanceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT subject_id, display_name, kind, responded_at
             FROM event_responses WHERE event_id = ?1
             ORDER BY responded_at, subject_id",
        )?;
        let rows = stmt
            .query_map([event_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(subject_id, display_name, kind, responded_at)| {
                let kind: ResponseKind = kind.parse().map_err(|reason| StoreError::Corrupt {
                    table: "event_responses",
                    reason,
                })?;
                Ok(AttendanceRecord {
                    subject_id: SubjectId(subject_id),
                    display_name,
                    kind,
                    responded_at: timestamp("event_responses", &responded_at)?,
                })
            })
            .collect()
    }

    async fn no_response_users(&self, event_id: &EventId) -> Result<Vec<NoResponseRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT rm.subject_id, rm.display_name
             FROM roster_members rm
             JOIN event_messages em ON em.guild_id = rm.guild_id
             WHERE em.event_id = ?1
               AND rm.subject_id NOT IN
                   (SELECT subject_id FROM event_responses WHERE event_id = ?1)
             ORDER BY rm.display_name",
        )?;
        let rows = stmt
            .query_map([event_id.as_str()], |row| {
                Ok(NoResponseRecord {
                    subject_id: SubjectId(row.get(0)?),
                    display_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn profiles(&self, ids: &[SubjectId]) -> Result<Vec<PilotProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT subject_id, callsign, board_number FROM pilots
             WHERE subject_id IN ({})",
            placeholders(ids.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter().map(|id| id.as_str())), |row| {
                Ok(PilotProfile {
                    subject_id: SubjectId(row.get(0)?),
                    callsign: row.get(1)?,
                    board_number: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn active_assignments(&self, ids: &[SubjectId]) -> Result<Vec<SquadronAssignment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT subject_id, squadron_id FROM squadron_assignments
             WHERE ended_at IS NULL AND subject_id IN ({})",
            placeholders(ids.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter().map(|id| id.as_str())), |row| {
                Ok(SquadronAssignment {
                    subject_id: SubjectId(row.get(0)?),
                    squadron_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn squadrons(&self, squadron_ids: &[String]) -> Result<Vec<Squadron>> {
        if squadron_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, designation FROM squadrons WHERE id IN ({})",
            placeholders(squadron_ids.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(squadron_ids.iter()), |row| {
                Ok(Squadron {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    designation: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn record_response(&self, event_id: &EventId, record: &AttendanceRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO event_responses
             (event_id, subject_id, display_name, kind, responded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(event_id, subject_id) DO UPDATE SET
               display_name = excluded.display_name,
               kind = excluded.kind,
               responded_at = excluded.responded_at",
            params![
                event_id.as_str(),
                record.subject_id.as_str(),
                record.display_name,
                record.kind.to_string(),
                ts(record.responded_at),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ClaimStore for SqliteStore {
    async fn insert_claim(&self, interaction_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO interaction_claims (interaction_id, expires_at) VALUES (?1, ?2)",
            params![interaction_id, ts(expires_at)],
        )?;
        Ok(())
    }

    async fn purge_expired_claims(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM interaction_claims WHERE expires_at < ?1",
            [ts(now)],
        )?;
        Ok(n)
    }
}
