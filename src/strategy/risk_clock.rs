//! Hold-time backstop. Stateless; every input is passed in.

use std::time::Duration;

use time::OffsetDateTime;

/// Time since entry, zero if `now` precedes `entry_time`.
pub fn elapsed(now: OffsetDateTime, entry_time: OffsetDateTime) -> Duration {
    (now - entry_time).try_into().unwrap_or(Duration::ZERO)
}

/// Inclusive: holding exactly `max_hold` forces the exit.
pub fn should_force_exit(elapsed: Duration, max_hold: Duration) -> bool {
    elapsed >= max_hold
}
