//! `muster-attendance` — everything between a button press and a rendered roster.
//!
//! * [`reconcile::Reconciler`] rebuilds the accepted / declined / tentative /
//!   no-response buckets from raw rows plus batched enrichment lookups.
//! * [`dedup::InteractionGuard`] makes button handling idempotent across bot
//!   instances (durable claim first, local cache second).
//! * [`respond::ResponseRecorder`] is the write path behind the buttons.
//! * [`render::RosterRenderer`] is the default [`muster_core::Renderer`].

pub mod dedup;
pub mod error;
pub mod reconcile;
pub mod render;
pub mod respond;

#[cfg(test)]
mod testing;

pub use dedup::InteractionGuard;
pub use error::{ReconcileError, RespondError};
pub use reconcile::Reconciler;
pub use render::RosterRenderer;
pub use respond::ResponseRecorder;
