use thiserror::Error;

use muster_attendance::ReconcileError;
use muster_health::RetryError;
use muster_store::StoreError;

/// Failure reported by a [`crate::MessageStore`].
#[derive(Debug, Clone, Error)]
pub enum MessageError {
    /// The message or its channel is gone. Terminal for the message's timer.
    #[error("message not found")]
    NotFound,

    #[error("message edit failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum CountdownError {
    #[error("database circuit is open")]
    CircuitOpen,

    #[error("database error: {0}")]
    Store(RetryError<StoreError>),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

impl CountdownError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CountdownError::Message(MessageError::NotFound))
    }
}

pub type Result<T> = std::result::Result<T, CountdownError>;
