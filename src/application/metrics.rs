//! Observability metrics for channels and admission control.
//!
//! All counters use relaxed atomics; they are monotonic tallies for
//! dashboards, not synchronization points.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing channel registry activity.
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct ChannelMetrics {
    inner: Arc<ChannelMetricsInner>,
}

#[derive(Debug, Default)]
struct ChannelMetricsInner {
    /// Subscriptions opened, including replacements
    subscriptions_opened: AtomicU64,
    /// Events handed to a live subscriber
    events_delivered: AtomicU64,
    /// Pushes for keys with no live subscriber
    pushes_unrouted: AtomicU64,
    /// Channels that went through the finalize path
    channels_retired: AtomicU64,
}

impl ChannelMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_opened(&self) {
        self.inner.subscriptions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.inner.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unrouted(&self) {
        self.inner.pushes_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retired(&self) {
        self.inner.channels_retired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of subscriptions opened.
    pub fn subscriptions_opened(&self) -> u64 {
        self.inner.subscriptions_opened.load(Ordering::Relaxed)
    }

    /// Get the total number of events delivered.
    pub fn events_delivered(&self) -> u64 {
        self.inner.events_delivered.load(Ordering::Relaxed)
    }

    /// Get the total number of pushes that found no subscriber.
    pub fn pushes_unrouted(&self) -> u64 {
        self.inner.pushes_unrouted.load(Ordering::Relaxed)
    }

    /// Get the total number of retired channels.
    pub fn channels_retired(&self) -> u64 {
        self.inner.channels_retired.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            subscriptions_opened: self.subscriptions_opened(),
            events_delivered: self.events_delivered(),
            pushes_unrouted: self.pushes_unrouted(),
            channels_retired: self.channels_retired(),
        }
    }
}

/// A point-in-time snapshot of [`ChannelMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMetricsSnapshot {
    pub subscriptions_opened: u64,
    pub events_delivered: u64,
    pub pushes_unrouted: u64,
    pub channels_retired: u64,
}

/// Counters describing rate limiter activity.
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct LimiterMetrics {
    inner: Arc<LimiterMetricsInner>,
}

#[derive(Debug, Default)]
struct LimiterMetricsInner {
    checks_allowed: AtomicU64,
    denied_cooldown: AtomicU64,
    denied_daily_limit: AtomicU64,
    actions_recorded: AtomicU64,
    entries_compacted: AtomicU64,
}

impl LimiterMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.checks_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied_cooldown(&self) {
        self.inner.denied_cooldown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied_daily_limit(&self) {
        self.inner.denied_daily_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_action(&self) {
        self.inner.actions_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compacted(&self, entries: u64) {
        self.inner
            .entries_compacted
            .fetch_add(entries, Ordering::Relaxed);
    }

    /// Get the number of checks that admitted the actor.
    pub fn checks_allowed(&self) -> u64 {
        self.inner.checks_allowed.load(Ordering::Relaxed)
    }

    /// Get the number of checks denied by the cooldown gate.
    pub fn denied_cooldown(&self) -> u64 {
        self.inner.denied_cooldown.load(Ordering::Relaxed)
    }

    /// Get the number of checks denied by the daily quota gate.
    pub fn denied_daily_limit(&self) -> u64 {
        self.inner.denied_daily_limit.load(Ordering::Relaxed)
    }

    /// Get the number of recorded actions.
    pub fn actions_recorded(&self) -> u64 {
        self.inner.actions_recorded.load(Ordering::Relaxed)
    }

    /// Get the number of entries removed by compaction.
    pub fn entries_compacted(&self) -> u64 {
        self.inner.entries_compacted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> LimiterMetricsSnapshot {
        LimiterMetricsSnapshot {
            checks_allowed: self.checks_allowed(),
            denied_cooldown: self.denied_cooldown(),
            denied_daily_limit: self.denied_daily_limit(),
            actions_recorded: self.actions_recorded(),
            entries_compacted: self.entries_compacted(),
        }
    }
}

/// A point-in-time snapshot of [`LimiterMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterMetricsSnapshot {
    pub checks_allowed: u64,
    pub denied_cooldown: u64,
    pub denied_daily_limit: u64,
    pub actions_recorded: u64,
    pub entries_compacted: u64,
}

impl LimiterMetricsSnapshot {
    /// Get the total number of admission checks.
    pub fn total_checks(&self) -> u64 {
        self.checks_allowed
            .saturating_add(self.denied_cooldown)
            .saturating_add(self.denied_daily_limit)
    }

    /// Fraction of checks that were denied (0.0 to 1.0).
    ///
    /// Returns 0.0 if no checks have been made.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            0.0
        } else {
            (self.denied_cooldown + self.denied_daily_limit) as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_metrics_initial_state() {
        let metrics = ChannelMetrics::new();
        assert_eq!(
            metrics.snapshot(),
            ChannelMetricsSnapshot {
                subscriptions_opened: 0,
                events_delivered: 0,
                pushes_unrouted: 0,
                channels_retired: 0,
            }
        );
    }

    #[test]
    fn test_channel_metrics_record() {
        let metrics = ChannelMetrics::new();
        metrics.record_opened();
        metrics.record_delivered();
        metrics.record_delivered();
        metrics.record_unrouted();
        metrics.record_retired();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.subscriptions_opened, 1);
        assert_eq!(snapshot.events_delivered, 2);
        assert_eq!(snapshot.pushes_unrouted, 1);
        assert_eq!(snapshot.channels_retired, 1);
    }

    #[test]
    fn test_limiter_denial_rate() {
        let metrics = LimiterMetrics::new();
        assert_eq!(metrics.snapshot().denial_rate(), 0.0);

        metrics.record_allowed();
        metrics.record_denied_cooldown();
        assert!((metrics.snapshot().denial_rate() - 0.5).abs() < f64::EPSILON);

        metrics.record_denied_daily_limit();
        metrics.record_allowed();
        assert_eq!(metrics.snapshot().total_checks(), 4);
        assert!((metrics.snapshot().denial_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_limiter_compacted_accumulates() {
        let metrics = LimiterMetrics::new();
        metrics.record_compacted(3);
        metrics.record_compacted(4);
        assert_eq!(metrics.entries_compacted(), 7);
    }

    #[test]
    fn test_metrics_clone_shares_counters() {
        let metrics1 = LimiterMetrics::new();
        metrics1.record_action();

        let metrics2 = metrics1.clone();
        metrics2.record_action();

        assert_eq!(metrics1.actions_recorded(), 2);
        assert_eq!(metrics2.actions_recorded(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = ChannelMetrics::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_delivered();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.events_delivered(), 1000);
    }
}
