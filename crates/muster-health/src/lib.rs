//! `muster-health` — database availability tracking.
//!
//! # Overview
//!
//! Every database round trip made by the countdown scheduler and the button
//! handlers goes through three pieces:
//!
//! | Piece                     | Role                                                   |
//! |---------------------------|--------------------------------------------------------|
//! | [`classify`]              | Decides whether an error is a network/availability one |
//! | [`CircuitBreaker`]        | Counts consecutive failures, fails fast while open     |
//! | [`RetryPolicy`]           | Bounded exponential backoff with jitter                |
//!
//! Callers check [`CircuitBreaker::is_open`] before starting any database
//! sequence and skip the work entirely while it reports open, so the message
//! shown on Discord keeps its last known-good state during an outage.

pub mod breaker;
pub mod classify;
pub mod error;
pub mod retry;

pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use classify::{is_connectivity_error, Classify};
pub use error::RetryError;
pub use retry::RetryPolicy;
