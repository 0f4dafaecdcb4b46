//! `muster-store` — persistence ports and their SQLite adapter.
//!
//! The countdown scheduler, the reconciler and the dedup guard only see the
//! traits in [`ports`]; [`sqlite::SqliteStore`] implements all of them over a
//! single `rusqlite` connection.

pub mod db;
pub mod error;
pub mod ports;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use ports::{AttendanceStore, ClaimStore, EventStore};
pub use sqlite::SqliteStore;
