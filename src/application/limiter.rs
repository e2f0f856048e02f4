//! Action rate limiter.
//!
//! Admits or refuses an actor's action based on two independent gates: a
//! cooldown since the actor's previous recorded action, and a per-calendar-day
//! quota. Checking never mutates admission state; the caller records the
//! action only after it actually succeeded.

use crate::application::metrics::LimiterMetrics;
use crate::application::ports::{Clock, Storage};
use crate::domain::admission::{Admission, CooldownEntry, DailyQuota, Denial, QuotaKey};
use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default minimum time between two actions of one actor.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default number of actions allowed per actor per calendar day.
pub const DEFAULT_DAILY_MAX: u32 = 10;

/// Minimum time a cooldown entry is kept after the action it records.
const COOLDOWN_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the action rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Minimum time between two actions; zero disables the cooldown gate
    pub cooldown: Duration,
    /// Maximum actions per actor per calendar day
    pub daily_max: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            daily_max: DEFAULT_DAILY_MAX,
        }
    }
}

/// Entries removed by one compaction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub cooldowns_removed: usize,
    pub quotas_removed: usize,
}

impl CompactionReport {
    /// Total number of entries removed.
    pub fn total(&self) -> usize {
        self.cooldowns_removed + self.quotas_removed
    }
}

/// Per-actor admission control combining a cooldown and a daily quota.
///
/// Cloning is cheap when the stores are shared handles such as
/// `Arc<ShardedStorage<..>>`; clones observe the same state.
#[derive(Clone)]
pub struct ActionRateLimiter<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone,
    Q: Storage<QuotaKey, DailyQuota> + Clone,
{
    cooldowns: C,
    quotas: Q,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
    metrics: LimiterMetrics,
}

impl<C, Q> fmt::Debug for ActionRateLimiter<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone,
    Q: Storage<QuotaKey, DailyQuota> + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRateLimiter")
            .field("config", &self.config)
            .field("tracked_cooldowns", &self.cooldowns.len())
            .field("tracked_quotas", &self.quotas.len())
            .finish()
    }
}

impl<C, Q> ActionRateLimiter<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone,
    Q: Storage<QuotaKey, DailyQuota> + Clone,
{
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `cooldowns` - Store of last-action timestamps keyed by actor
    /// * `quotas` - Store of daily counters keyed by actor and date
    /// * `clock` - Wall clock deciding elapsed time and the current day
    /// * `config` - Cooldown and daily maximum
    pub fn new(cooldowns: C, quotas: Q, clock: Arc<dyn Clock>, config: LimiterConfig) -> Self {
        Self {
            cooldowns,
            quotas,
            clock,
            config,
            metrics: LimiterMetrics::new(),
        }
    }

    /// Decide whether `actor` may act now.
    ///
    /// When both gates refuse, the daily limit is reported since waiting out
    /// the cooldown would not help. Denials are logged at warn level.
    pub fn check(&self, actor: &str) -> Admission {
        let now = self.clock.now();
        let admission = self.evaluate(actor, now);

        match admission {
            Admission::Allowed => self.metrics.record_allowed(),
            Admission::Denied(Denial::Cooldown { retry_after }) => {
                self.metrics.record_denied_cooldown();
                warn!(
                    actor,
                    retry_after_secs = retry_after.as_secs(),
                    "action denied: cooldown active"
                );
            }
            Admission::Denied(Denial::DailyLimit { limit }) => {
                self.metrics.record_denied_daily_limit();
                warn!(actor, limit, "action denied: daily limit reached");
            }
        }

        admission
    }

    /// Returns true if `actor` may act now.
    pub fn can_act(&self, actor: &str) -> bool {
        self.check(actor).is_allowed()
    }

    fn evaluate(&self, actor: &str, now: DateTime<FixedOffset>) -> Admission {
        let today = now.date_naive();
        let count = self
            .quotas
            .with_entry(&QuotaKey::new(actor, today), |quota| quota.count_on(today))
            .unwrap_or(0);
        if count >= self.config.daily_max {
            return Admission::Denied(Denial::DailyLimit {
                limit: self.config.daily_max,
            });
        }

        let retry_after = self
            .cooldowns
            .with_entry(&actor.to_string(), |entry| {
                entry.remaining(now, self.config.cooldown)
            })
            .unwrap_or(Duration::ZERO);
        if !retry_after.is_zero() {
            return Admission::Denied(Denial::Cooldown { retry_after });
        }

        Admission::Allowed
    }

    /// Record a performed action for `actor`.
    ///
    /// Unconditional: the caller is expected to have checked admission first.
    /// Updates for one actor are applied under that actor's entry lock, so
    /// concurrent records never lose an increment.
    ///
    /// # Returns
    /// The actor's count for today after this action.
    pub fn record_action(&self, actor: &str) -> u32 {
        let now = self.clock.now();
        let today = now.date_naive();

        self.cooldowns.with_entry_mut(
            actor.to_string(),
            || CooldownEntry::new(now),
            |entry| entry.touch(now),
        );
        let count = self.quotas.with_entry_mut(
            QuotaKey::new(actor, today),
            || DailyQuota::new(today),
            |quota| quota.increment(today),
        );

        self.metrics.record_action();
        debug!(actor, count, "action recorded");
        count
    }

    /// Seconds left before the cooldown is satisfied, rounded up; zero for an
    /// actor who never acted.
    ///
    /// Never zero while the cooldown still denies the actor.
    pub fn remaining_cooldown_secs(&self, actor: &str) -> u64 {
        let now = self.clock.now();
        let remaining = self
            .cooldowns
            .with_entry(&actor.to_string(), |entry| {
                entry.remaining(now, self.config.cooldown)
            })
            .unwrap_or(Duration::ZERO);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Timestamp of the latest recorded action of `actor`, if still tracked.
    pub fn last_action_at(&self, actor: &str) -> Option<DateTime<FixedOffset>> {
        self.cooldowns
            .with_entry(&actor.to_string(), |entry| entry.last_action_at())
    }

    /// Actions left today; the full daily maximum when nothing was recorded.
    pub fn remaining_daily_quota(&self, actor: &str) -> u32 {
        let today = self.clock.now().date_naive();
        let used = self
            .quotas
            .with_entry(&QuotaKey::new(actor, today), |quota| quota.count_on(today))
            .unwrap_or(0);
        self.config.daily_max.saturating_sub(used)
    }

    /// Drop state that can no longer affect admission.
    ///
    /// Removes cooldown entries older than 24 hours (or the cooldown itself,
    /// when longer) before `now` and quota
    /// buckets dated neither on `now`'s day nor the day before. Each pass is
    /// isolated: a panicking pass is logged and counts as zero removals, and
    /// whatever it removed before panicking stays removed.
    pub fn compact(&self, now: DateTime<FixedOffset>) -> CompactionReport {
        let report = CompactionReport {
            cooldowns_removed: self.isolated("cooldowns", || self.compact_cooldowns(now)),
            quotas_removed: self.isolated("quotas", || self.compact_quotas(now)),
        };

        self.metrics.record_compacted(report.total() as u64);
        debug!(
            cooldowns_removed = report.cooldowns_removed,
            quotas_removed = report.quotas_removed,
            "compaction finished"
        );
        report
    }

    /// Compact using the limiter's own clock.
    pub fn compact_now(&self) -> CompactionReport {
        self.compact(self.clock.now())
    }

    fn compact_cooldowns(&self, now: DateTime<FixedOffset>) -> usize {
        let retention = self.config.cooldown.max(COOLDOWN_RETENTION);
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention));
        let cutoff = match cutoff {
            Some(cutoff) => cutoff,
            None => {
                warn!(%now, "cannot compute cooldown cutoff, skipping pass");
                return 0;
            }
        };

        let mut removed = 0;
        self.cooldowns.retain(|_, entry| {
            let keep = entry.last_action_at() >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn compact_quotas(&self, now: DateTime<FixedOffset>) -> usize {
        let today = now.date_naive();
        let yesterday = match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => {
                warn!(%today, "cannot compute previous day, skipping pass");
                return 0;
            }
        };

        let mut removed = 0;
        self.quotas.retain(|key, _| {
            let keep = key.date == today || key.date == yesterday;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn isolated(&self, pass: &'static str, run: impl FnOnce() -> usize) -> usize {
        match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(removed) => removed,
            Err(_) => {
                error!(pass, "compaction pass panicked");
                0
            }
        }
    }

    /// Forget everything recorded for `actor`.
    pub fn reset_actor(&self, actor: &str) {
        self.cooldowns.remove(&actor.to_string());
        self.quotas.retain(|key, _| key.actor != actor);
        info!(actor, "actor state reset");
    }

    /// Forget everything recorded for every actor.
    pub fn clear(&self) {
        self.cooldowns.clear();
        self.quotas.clear();
        info!("rate limiter state cleared");
    }

    /// Number of actors with a stored cooldown entry.
    pub fn tracked_cooldowns(&self) -> usize {
        self.cooldowns.len()
    }

    /// Number of stored quota buckets, stale ones included.
    pub fn tracked_quotas(&self) -> usize {
        self.quotas.len()
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &LimiterMetrics {
        &self.metrics
    }
}
