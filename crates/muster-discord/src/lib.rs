//! `muster-discord` — serenity glue for the countdown messages.
//!
//! * [`adapter::DiscordAdapter`] owns the gateway connection and reconnects
//!   forever.
//! * [`handler::MusterHandler`] sets presence, starts the countdown scheduler
//!   on the first `ready`, and routes button presses.
//! * [`message_store::SerenityMessageStore`] is the scheduler's
//!   [`muster_countdown::MessageStore`] over Discord's REST API.

pub mod adapter;
pub mod buttons;
pub mod context;
pub mod error;
pub mod handler;
pub mod message_store;
pub mod view;

pub use adapter::DiscordAdapter;
pub use context::MusterContext;
pub use error::DiscordError;
pub use message_store::SerenityMessageStore;
