//! Periodic compaction of rate limiter state.
//!
//! Runs `compact_now` on a fixed interval in a background Tokio task so that
//! per-actor state stays bounded without callers scheduling it themselves.

use crate::application::limiter::{ActionRateLimiter, CompactionReport};
use crate::application::ports::Storage;
use crate::domain::admission::{CooldownEntry, DailyQuota, QuotaKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Default time between two compaction runs.
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Error returned when compactor configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactorConfigError {
    /// Compaction interval must be greater than zero
    ZeroInterval,
}

impl std::fmt::Display for CompactorConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactorConfigError::ZeroInterval => {
                write!(f, "compaction interval must be greater than 0")
            }
        }
    }
}

impl std::error::Error for CompactorConfigError {}

/// Error returned when the compaction task does not stop cleanly.
#[derive(Debug)]
pub enum ShutdownError {
    /// The task panicked before it could observe the shutdown signal
    TaskPanicked,
    /// The task was aborted by the runtime
    TaskCancelled,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::TaskPanicked => write!(f, "compaction task panicked"),
            ShutdownError::TaskCancelled => write!(f, "compaction task was cancelled"),
        }
    }
}

impl std::error::Error for ShutdownError {}

impl From<tokio::task::JoinError> for ShutdownError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            ShutdownError::TaskPanicked
        } else {
            ShutdownError::TaskCancelled
        }
    }
}

/// Configuration for periodic compaction.
#[derive(Debug, Clone)]
pub struct CompactorConfig {
    /// How often to compact
    pub interval: Duration,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_COMPACTION_INTERVAL,
        }
    }
}

impl CompactorConfig {
    /// Create a new compactor config with the specified interval.
    ///
    /// # Errors
    /// Returns `CompactorConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, CompactorConfigError> {
        if interval.is_zero() {
            return Err(CompactorConfigError::ZeroInterval);
        }
        Ok(Self { interval })
    }
}

/// Drives `compact_now` on a limiter at a fixed interval.
pub struct Compactor<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone,
    Q: Storage<QuotaKey, DailyQuota> + Clone,
{
    limiter: ActionRateLimiter<C, Q>,
    config: CompactorConfig,
}

impl<C, Q> Compactor<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone + 'static,
    Q: Storage<QuotaKey, DailyQuota> + Clone + 'static,
{
    /// Create a new compactor for `limiter`.
    pub fn new(limiter: ActionRateLimiter<C, Q>, config: CompactorConfig) -> Self {
        Self { limiter, config }
    }

    /// Run a single compaction immediately.
    pub fn run_once(&self) -> CompactionReport {
        self.limiter.compact_now()
    }

    /// Start compacting in the background.
    ///
    /// The first run happens one interval after start. Must be called from
    /// within a Tokio runtime. Dropping the returned handle leaves the task
    /// running; call [`CompactorHandle::shutdown`] to stop it.
    pub fn start(self) -> CompactorHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let period = self.config.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        let report = self.run_once();
                        debug!(
                            cooldowns_removed = report.cooldowns_removed,
                            quotas_removed = report.quotas_removed,
                            "periodic compaction"
                        );
                    }
                }
            }
            info!("compactor stopped");
        });

        info!(interval_secs = period.as_secs(), "compactor started");
        CompactorHandle { shutdown, task }
    }

    /// Get the compactor configuration.
    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }
}

/// Handle to a running compactor.
#[derive(Debug)]
pub struct CompactorHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl CompactorHandle {
    /// Stop the compactor and wait for its task to finish.
    ///
    /// A run already in progress completes first.
    ///
    /// # Errors
    /// Returns `ShutdownError` if the task panicked or was cancelled.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        // Stored as a permit if the task is busy compacting.
        self.shutdown.notify_one();
        self.task.await?;
        Ok(())
    }

    /// Whether the background task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
