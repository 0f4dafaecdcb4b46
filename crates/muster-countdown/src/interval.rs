use std::time::Duration;

use chrono::{DateTime, Utc};

use muster_core::types::Event;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3_600);

/// What a message's timer should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Refresh the countdown after this delay.
    Periodic(Duration),
    /// The event is running: no more countdown refreshes, one final edit
    /// exactly when it ends.
    AtEnd(Duration),
    /// The event is over; apply the finished state now.
    Finalize,
}

/// Refresh cadence for a given time until the event starts.
///
/// Returns `None` once the event has started.
pub fn refresh_interval(until_start: chrono::Duration) -> Option<Duration> {
    if until_start <= chrono::Duration::zero() {
        None
    } else if until_start <= chrono::Duration::hours(1) {
        Some(MINUTE)
    } else if until_start <= chrono::Duration::hours(6) {
        Some(15 * MINUTE)
    } else if until_start <= chrono::Duration::hours(24) {
        Some(HOUR)
    } else {
        Some(24 * HOUR)
    }
}

/// Decide the next step for `event` as of `now`.
///
/// Periodic refreshes never overshoot the end of the event, so the finished
/// state is not delayed by a long countdown interval.
pub fn plan_next(event: &Event, now: DateTime<Utc>) -> Plan {
    if event.has_ended(now) {
        return Plan::Finalize;
    }
    let until_end = to_std(event.end_time - now);
    match refresh_interval(event.start_time - now) {
        Some(every) => Plan::Periodic(every.min(until_end)),
        None => Plan::AtEnd(until_end),
    }
}

fn to_std(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}
