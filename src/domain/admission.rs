//! Admission records and decisions for the action rate limiter.
//!
//! Two independent gates guard an action:
//! - a cooldown, the minimum time between two actions of the same actor
//! - a daily quota, the maximum number of actions per calendar day
//!
//! Both records are plain data here; the application layer owns the maps
//! they live in and the clock that drives them.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::fmt;
use std::time::Duration;

/// Timestamp of an actor's most recent recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownEntry {
    last_action_at: DateTime<FixedOffset>,
}

impl CooldownEntry {
    /// Create an entry for an action performed at `at`.
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self { last_action_at: at }
    }

    /// When the last action was recorded.
    pub fn last_action_at(&self) -> DateTime<FixedOffset> {
        self.last_action_at
    }

    /// Record a new action.
    ///
    /// The stored timestamp never moves backwards, so a late-arriving
    /// record with an older clock reading cannot reopen the cooldown.
    pub fn touch(&mut self, at: DateTime<FixedOffset>) {
        if at > self.last_action_at {
            self.last_action_at = at;
        }
    }

    /// Time elapsed since the last action, saturating at zero when the
    /// clock reads earlier than the stored timestamp.
    pub fn elapsed(&self, now: DateTime<FixedOffset>) -> Duration {
        (now - self.last_action_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time left before the cooldown is satisfied.
    pub fn remaining(&self, now: DateTime<FixedOffset>, cooldown: Duration) -> Duration {
        cooldown.saturating_sub(self.elapsed(now))
    }
}

/// Key of a daily quota bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub actor: String,
    pub date: NaiveDate,
}

impl QuotaKey {
    pub fn new(actor: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            actor: actor.into(),
            date,
        }
    }
}

/// Number of actions recorded for one actor on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyQuota {
    date: NaiveDate,
    count: u32,
}

impl DailyQuota {
    /// An empty bucket for `date`.
    pub fn new(date: NaiveDate) -> Self {
        Self { date, count: 0 }
    }

    /// The calendar day this bucket counts.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Raw stored count, regardless of the day it belongs to.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Count as observed on `today`.
    ///
    /// A bucket for any other day is stale and reads as zero.
    pub fn count_on(&self, today: NaiveDate) -> u32 {
        if self.date == today {
            self.count
        } else {
            0
        }
    }

    /// Increment the count for `today`, rolling a stale bucket over first.
    ///
    /// Returns the count after the increment.
    pub fn increment(&mut self, today: NaiveDate) -> u32 {
        if self.date != today {
            self.date = today;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The previous action was too recent
    Cooldown {
        /// Time until the cooldown is satisfied
        retry_after: Duration,
    },
    /// Today's quota is used up
    DailyLimit {
        /// The configured daily maximum
        limit: u32,
    },
}

impl Denial {
    /// Wait time rounded up to whole minutes, at least one.
    fn retry_after_minutes(retry_after: Duration) -> u64 {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        secs.div_ceil(60).max(1)
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::Cooldown { retry_after } => {
                let minutes = Self::retry_after_minutes(*retry_after);
                let unit = if minutes == 1 { "minute" } else { "minutes" };
                write!(f, "please wait {} {} before trying again", minutes, unit)
            }
            Denial::DailyLimit { limit } => {
                write!(
                    f,
                    "daily limit of {} actions reached, try again tomorrow",
                    limit
                )
            }
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Both gates pass
    Allowed,
    /// At least one gate refuses
    Denied(Denial),
}

impl Admission {
    /// Returns true if the action may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// The denial, if any.
    pub fn denial(&self) -> Option<Denial> {
        match self {
            Admission::Allowed => None,
            Admission::Denied(denial) => Some(*denial),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 10, h, m, s)
            .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_cooldown_touch_is_monotonic() {
        let mut entry = CooldownEntry::new(at(12, 0, 0));
        entry.touch(at(11, 0, 0));
        assert_eq!(entry.last_action_at(), at(12, 0, 0));

        entry.touch(at(12, 5, 0));
        assert_eq!(entry.last_action_at(), at(12, 5, 0));
    }

    #[test]
    fn test_cooldown_remaining() {
        let entry = CooldownEntry::new(at(12, 0, 0));
        let cooldown = Duration::from_secs(60);

        assert_eq!(entry.remaining(at(12, 0, 20), cooldown), Duration::from_secs(40));
        assert_eq!(entry.remaining(at(12, 1, 0), cooldown), Duration::ZERO);
        assert_eq!(entry.remaining(at(12, 3, 0), cooldown), Duration::ZERO);
    }

    #[test]
    fn test_cooldown_elapsed_saturates_when_clock_goes_back() {
        let entry = CooldownEntry::new(at(12, 0, 0));
        assert_eq!(entry.elapsed(at(11, 59, 0)), Duration::ZERO);
        assert_eq!(
            entry.remaining(at(11, 59, 0), Duration::from_secs(60)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_quota_count_on_other_day_reads_zero() {
        let mut quota = DailyQuota::new(day(10));
        quota.increment(day(10));
        quota.increment(day(10));

        assert_eq!(quota.count_on(day(10)), 2);
        assert_eq!(quota.count_on(day(11)), 0);
    }

    #[test]
    fn test_quota_increment_rolls_over() {
        let mut quota = DailyQuota::new(day(10));
        assert_eq!(quota.increment(day(10)), 1);
        assert_eq!(quota.increment(day(10)), 2);

        assert_eq!(quota.increment(day(11)), 1);
        assert_eq!(quota.date(), day(11));
    }

    #[test]
    fn test_denial_messages() {
        let cooldown = Denial::Cooldown {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(cooldown.to_string(), "please wait 1 minute before trying again");

        let long = Denial::Cooldown {
            retry_after: Duration::from_secs(121),
        };
        assert_eq!(long.to_string(), "please wait 3 minutes before trying again");

        let limit = Denial::DailyLimit { limit: 10 };
        assert_eq!(
            limit.to_string(),
            "daily limit of 10 actions reached, try again tomorrow"
        );
    }

    #[test]
    fn test_admission_accessors() {
        assert!(Admission::Allowed.is_allowed());
        assert_eq!(Admission::Allowed.denial(), None);

        let denied = Admission::Denied(Denial::DailyLimit { limit: 3 });
        assert!(!denied.is_allowed());
        assert_eq!(denied.denial(), Some(Denial::DailyLimit { limit: 3 }));
    }
}
