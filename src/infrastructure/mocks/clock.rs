//! Mock clock for testing.

use crate::application::ports::Clock;
use chrono::{DateTime, FixedOffset, TimeZone};
use std::sync::{Arc, Mutex};

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of cooldowns, calendar-day rollover and compaction.
///
/// # Examples
///
/// ```
/// use pulse_guard::infrastructure::mocks::MockClock;
/// use pulse_guard::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::utc(2024, 3, 10, 23, 59, 0);
/// let start = clock.now();
///
/// // Advance time explicitly
/// clock.advance(Duration::from_secs(120));
/// assert_eq!(clock.now(), start + chrono::Duration::seconds(120));
///
/// // Crossing midnight changes the calendar day
/// assert_ne!(clock.now().date_naive(), start.date_naive());
/// ```
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned to share across threads.
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific date-time.
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a mock clock at a UTC calendar date and time.
    ///
    /// # Panics
    /// Panics if the date or time is invalid.
    pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let utc = FixedOffset::east_opt(0).expect("zero offset is valid");
        let start = utc
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .expect("MockClock::utc called with an invalid date or time");
        Self::new(start)
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: std::time::Duration) {
        let delta = chrono::Duration::from_std(duration)
            .expect("MockClock::advance called with a duration chrono cannot represent");
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time += delta;
    }

    /// Move the clock backwards, simulating a wall-clock correction.
    pub fn rewind(&self, duration: std::time::Duration) {
        let delta = chrono::Duration::from_std(duration)
            .expect("MockClock::rewind called with a duration chrono cannot represent");
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time -= delta;
    }

    /// Set the clock to a specific date-time.
    pub fn set(&self, instant: DateTime<FixedOffset>) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}
