//! Wall-clock abstraction for the control loop.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually advanced clock for simulation and tests.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use grow_dispatch::dispatch::clock::{Clock, ManualClock};
///
/// let start = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
/// let clock = ManualClock::new(start);
/// clock.advance(Duration::hours(2));
/// assert_eq!(clock.now(), start + Duration::hours(2));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock();
        *now += step;
    }

    /// Sets the clock to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Converts `now` to facility-local time using a fixed UTC offset.
pub fn local_time(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDateTime {
    (now + Duration::minutes(i64::from(utc_offset_minutes))).naive_utc()
}
