use thiserror::Error;

use muster_core::types::EventId;
use muster_health::RetryError;
use muster_store::StoreError;

/// Why a roster could not be rebuilt. Any of these means "do not render".
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("database circuit is open")]
    CircuitOpen,

    #[error("failed to load responses: {0}")]
    Responses(RetryError<StoreError>),

    #[error("failed to load {table}: {cause}")]
    Enrichment {
        table: &'static str,
        cause: RetryError<StoreError>,
    },
}

/// Failure of the button write path.
#[derive(Debug, Error)]
pub enum RespondError {
    #[error("database circuit is open")]
    CircuitOpen,

    #[error("event {0} does not exist")]
    UnknownEvent(EventId),

    #[error("failed to load event: {0}")]
    EventLookup(RetryError<StoreError>),

    #[error("failed to store response: {0}")]
    Write(RetryError<StoreError>),

    #[error("response stored but roster rebuild failed: {0}")]
    Reconcile(#[from] ReconcileError),
}
