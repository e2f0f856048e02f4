//! Builders wiring the registry and the limiter to in-memory storage.

use crate::application::{
    limiter::{ActionRateLimiter, LimiterConfig},
    ports::Clock,
    registry::{Channel, ChannelConfig, EventChannelRegistry},
};
use crate::domain::admission::{CooldownEntry, DailyQuota, QuotaKey};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::Duration;

/// Channel registry over sharded in-memory storage.
pub type InMemoryChannelRegistry = EventChannelRegistry<Arc<ShardedStorage<String, Channel>>>;

/// Rate limiter over sharded in-memory storage.
pub type InMemoryRateLimiter = ActionRateLimiter<
    Arc<ShardedStorage<String, CooldownEntry>>,
    Arc<ShardedStorage<QuotaKey, DailyQuota>>,
>;

/// Error returned when building a registry or a limiter fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Subscription buffer capacity must be greater than zero
    ZeroBufferCapacity,
    /// Stream timeout must be greater than zero
    ZeroStreamTimeout,
    /// Daily maximum must be greater than zero
    ZeroDailyLimit,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ZeroBufferCapacity => {
                write!(f, "buffer_capacity must be greater than 0")
            }
            BuildError::ZeroStreamTimeout => {
                write!(f, "stream_timeout must be greater than 0")
            }
            BuildError::ZeroDailyLimit => {
                write!(f, "daily_max must be greater than 0")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for constructing an [`InMemoryChannelRegistry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    config: ChannelConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl RegistryBuilder {
    /// Set how long a stream may stay open.
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_timeout = timeout;
        self
    }

    /// Set how many undelivered events a subscription may buffer.
    ///
    /// A push to a full buffer fails and retires the channel.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Set the message of the `connected` confirmation.
    pub fn with_connected_message(mut self, message: impl Into<String>) -> Self {
        self.config.connected_message = message.into();
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the registry.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<InMemoryChannelRegistry, BuildError> {
        if self.config.buffer_capacity == 0 {
            return Err(BuildError::ZeroBufferCapacity);
        }
        if self.config.stream_timeout.is_zero() {
            return Err(BuildError::ZeroStreamTimeout);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        Ok(EventChannelRegistry::new(
            Arc::new(ShardedStorage::new()),
            clock,
            self.config,
        ))
    }
}

impl EventChannelRegistry<Arc<ShardedStorage<String, Channel>>> {
    /// Create a builder for configuring the registry.
    ///
    /// Defaults:
    /// - Stream timeout: 5 minutes
    /// - Buffer capacity: 32 events
    /// - Confirmation message: "Connected to order updates"
    /// - Clock: system local time
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            config: ChannelConfig::default(),
            clock: None,
        }
    }

    /// Create a registry with default settings.
    ///
    /// # Panics
    /// This method cannot panic because all default values are valid.
    pub fn with_defaults() -> Self {
        Self::builder()
            .build()
            .expect("default configuration is always valid")
    }
}

/// Builder for constructing an [`InMemoryRateLimiter`].
#[derive(Debug)]
pub struct LimiterBuilder {
    config: LimiterConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl LimiterBuilder {
    /// Set the minimum time between two actions of one actor.
    ///
    /// Zero disables the cooldown gate.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    /// Set the maximum number of actions per actor per calendar day.
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_daily_max(mut self, daily_max: u32) -> Self {
        self.config.daily_max = daily_max;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the limiter.
    ///
    /// # Errors
    /// Returns `BuildError::ZeroDailyLimit` if the daily maximum is zero.
    pub fn build(self) -> Result<InMemoryRateLimiter, BuildError> {
        if self.config.daily_max == 0 {
            return Err(BuildError::ZeroDailyLimit);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        Ok(ActionRateLimiter::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(ShardedStorage::new()),
            clock,
            self.config,
        ))
    }
}

impl
    ActionRateLimiter<
        Arc<ShardedStorage<String, CooldownEntry>>,
        Arc<ShardedStorage<QuotaKey, DailyQuota>>,
    >
{
    /// Create a builder for configuring the limiter.
    ///
    /// Defaults:
    /// - Cooldown: 1 minute
    /// - Daily maximum: 10 actions
    /// - Clock: system local time
    pub fn builder() -> LimiterBuilder {
        LimiterBuilder {
            config: LimiterConfig::default(),
            clock: None,
        }
    }

    /// Create a limiter with default settings.
    ///
    /// # Panics
    /// This method cannot panic because all default values are valid.
    pub fn with_defaults() -> Self {
        Self::builder()
            .build()
            .expect("default configuration is always valid")
    }
}
