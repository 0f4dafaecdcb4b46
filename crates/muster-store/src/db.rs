use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Result};

/// Initialise Muster tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_events_tables(conn)?;
    create_responses_table(conn)?;
    create_roster_tables(conn)?;
    create_claims_table(conn)?;
    Ok(())
}

fn create_events_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id                   TEXT NOT NULL PRIMARY KEY,
            title                TEXT NOT NULL,
            description          TEXT NOT NULL DEFAULT '',
            start_time           TEXT NOT NULL,
            end_time             TEXT NOT NULL,
            creator_name         TEXT,
            creator_board_number TEXT,
            image_url            TEXT,
            timezone             TEXT,
            track_no_response    INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_events_end
            ON events(end_time);

        -- One row per Discord message an event was published to.
        CREATE TABLE IF NOT EXISTS event_messages (
            message_id  INTEGER NOT NULL PRIMARY KEY,
            event_id    TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            guild_id    INTEGER NOT NULL,
            channel_id  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_event_messages_event
            ON event_messages(event_id);",
    )
}

/// Latest answer per (event, subject); an upsert replaces the previous one.
fn create_responses_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS event_responses (
            event_id     TEXT NOT NULL,
            subject_id   TEXT NOT NULL,
            display_name TEXT NOT NULL,
            kind         TEXT NOT NULL,
            responded_at TEXT NOT NULL,
            UNIQUE(event_id, subject_id)
        );
        CREATE INDEX IF NOT EXISTS idx_responses_event
            ON event_responses(event_id, responded_at);",
    )
}

fn create_roster_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pilots (
            subject_id   TEXT NOT NULL PRIMARY KEY,
            callsign     TEXT NOT NULL,
            board_number TEXT
        );
        CREATE TABLE IF NOT EXISTS squadrons (
            id          TEXT NOT NULL PRIMARY KEY,
            name        TEXT NOT NULL,
            designation TEXT
        );
        -- An assignment is active while ended_at is NULL.
        CREATE TABLE IF NOT EXISTS squadron_assignments (
            subject_id  TEXT NOT NULL,
            squadron_id TEXT NOT NULL,
            started_at  TEXT NOT NULL,
            ended_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_assignments_subject
            ON squadron_assignments(subject_id);
        CREATE TABLE IF NOT EXISTS roster_members (
            guild_id     INTEGER NOT NULL,
            subject_id   TEXT NOT NULL,
            display_name TEXT NOT NULL,
            PRIMARY KEY (guild_id, subject_id)
        );",
    )
}

/// Durable interaction claims; the primary key is the cross-instance lock.
fn create_claims_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS interaction_claims (
            interaction_id TEXT NOT NULL PRIMARY KEY,
            expires_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_claims_expiry
            ON interaction_claims(expires_at);",
    )
}

/// Fixed-width UTC timestamp so stored values compare correctly as text.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
