use rusqlite::ErrorCode;
use thiserror::Error;

use muster_health::{is_connectivity_error, Classify};

/// Errors surfaced by the persistence ports.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The database could not be reached (busy, locked, connection lost).
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// Uniqueness or foreign-key constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Malformed query, missing table, permission problem.
    #[error("database error: {0}")]
    Query(String),

    /// A stored row could not be decoded.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

impl Classify for StoreError {
    fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Query(msg) => is_connectivity_error(msg),
            StoreError::Constraint(_) | StoreError::Corrupt { .. } => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure => StoreError::Unavailable(e.to_string()),
                ErrorCode::ConstraintViolation => StoreError::Constraint(e.to_string()),
                _ => StoreError::Query(e.to_string()),
            },
            _ => StoreError::Query(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_connectivity() {
        assert!(StoreError::Unavailable("pool closed".into()).is_connectivity());
    }

    #[test]
    fn query_text_is_classified() {
        assert!(StoreError::Query("connection reset by peer".into()).is_connectivity());
        assert!(!StoreError::Query("no such table: events".into()).is_connectivity());
    }

    #[test]
    fn constraint_is_never_retried() {
        let e = StoreError::Constraint("UNIQUE constraint failed".into());
        assert!(!e.is_connectivity());
        assert!(e.is_unique_violation());
    }
}
