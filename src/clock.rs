//! Time sources.
//!
//! The client reads two clocks: a monotonic [`Instant`] for its own timers (submission
//! timeout, affordance refresh) and a wall clock for the ISO-8601 timestamps it puts on the
//! wire and for comparing against server cooldowns, which are absolute epoch seconds.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use web_time::{Duration, Instant};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic time used for local timers.
    fn now(&self) -> Instant;

    /// Wall-clock time used for wire timestamps and cooldown comparisons.
    fn wall(&self) -> DateTime<Utc>;

    /// Wall-clock time as fractional seconds since the Unix epoch.
    fn epoch_secs(&self) -> f64 {
        self.wall().timestamp_millis() as f64 / 1000.0
    }
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same offset, so a test can keep one handle and give another to the client.
///
/// ```
/// use coop_sync::{Clock, ManualClock};
/// use web_time::Duration;
///
/// let clock = ManualClock::at_epoch_secs(1_700_000_000);
/// let handle = clock.clone();
/// let start = clock.now();
///
/// handle.advance(Duration::from_millis(4000));
/// assert_eq!(clock.now() - start, Duration::from_millis(4000));
/// assert_eq!(clock.epoch_secs(), 1_700_000_004.0);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Creates a manual clock whose wall time starts at `wall_origin`.
    #[must_use]
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Creates a manual clock whose wall time starts at the given Unix timestamp.
    #[must_use]
    pub fn at_epoch_secs(secs: i64) -> Self {
        Self::new(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Moves both clocks forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset = offset.saturating_add(by);
    }

    /// Total time advanced since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_epoch_secs(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.elapsed().as_millis()).unwrap_or(i64::MAX);
        TimeDelta::try_milliseconds(millis)
            .and_then(|delta| self.wall_origin.checked_add_signed(delta))
            .unwrap_or(self.wall_origin)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_origin() {
        let clock = ManualClock::at_epoch_secs(100);
        assert_eq!(clock.wall().timestamp(), 100);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn manual_clock_clones_share_offset() {
        let clock = ManualClock::default();
        let other = clock.clone();
        other.advance(Duration::from_millis(1500));
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
        assert_eq!(clock.epoch_secs(), 1_700_000_001.5);
    }

    #[test]
    fn system_clock_epoch_is_recent() {
        assert!(SystemClock.epoch_secs() > 1_600_000_000.0);
    }
}
