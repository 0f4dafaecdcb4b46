//! `muster-countdown` — keeps published event messages up to date.
//!
//! Each published message gets its own timer task. The refresh cadence
//! tightens as the event approaches (see [`interval::plan_next`]), a final
//! "finished" edit is always applied once the event ends, and every firing
//! goes through the circuit breaker and the fail-closed reconciler before
//! the message is touched.

pub mod clock;
pub mod error;
pub mod interval;
pub mod ports;
pub mod scheduler;

pub use clock::{Clock, SystemClock, TokioClock};
pub use error::{CountdownError, MessageError, Result};
pub use interval::{plan_next, refresh_interval, Plan};
pub use ports::MessageStore;
pub use scheduler::{CountdownOptions, CountdownScheduler, SchedulerDeps};
