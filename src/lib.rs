//! # pulse-guard
//!
//! Real-time notification and abuse control for request-driven backends.
//!
//! This crate provides two independent components that share nothing but a
//! clock abstraction:
//!
//! - [`EventChannelRegistry`]: a per-key push channel registry. A client
//!   subscribes to a key (an order id, say) and receives named events pushed
//!   by unrelated request handlers, typically relayed as Server-Sent Events.
//! - [`ActionRateLimiter`]: per-actor admission control combining a cooldown
//!   between actions with a per-calendar-day quota.
//!
//! ## Quick Start
//!
//! ### Pushing status updates
//!
//! ```rust
//! use pulse_guard::{EventChannelRegistry, PushOutcome};
//!
//! let registry = EventChannelRegistry::with_defaults();
//!
//! // A client starts listening for updates on its order.
//! let mut subscription = registry.subscribe("ORD-1001");
//! let connected = subscription.try_recv().unwrap();
//! assert_eq!(connected.name(), "connected");
//!
//! // Later, a payment callback handler pushes a status change.
//! let outcome = registry
//!     .push_payment_update("ORD-1001", "PAID", "Payment confirmed", Some("TX-9"))
//!     .unwrap();
//! assert_eq!(outcome, PushOutcome::Delivered);
//!
//! let update = subscription.try_recv().unwrap();
//! print!("{}", update.to_sse_frame());
//! ```
//!
//! Only the most recent subscriber of a key receives events ("last
//! subscriber wins"). Pushing to a key without a subscriber is a no-op and
//! reports [`PushOutcome::NoSubscriber`].
//!
//! ### Guarding an action
//!
//! ```rust
//! use pulse_guard::{ActionRateLimiter, Admission};
//! use std::time::Duration;
//!
//! let limiter = ActionRateLimiter::builder()
//!     .with_cooldown(Duration::from_secs(60))
//!     .with_daily_max(10)
//!     .build()
//!     .unwrap();
//!
//! match limiter.check("user-42") {
//!     Admission::Allowed => {
//!         // ... persist the review ...
//!         limiter.record_action("user-42");
//!     }
//!     Admission::Denied(denial) => println!("{}", denial),
//! }
//!
//! assert!(!limiter.can_act("user-42"));
//! assert_eq!(limiter.remaining_daily_quota("user-42"), 9);
//! ```
//!
//! [`ActionGuard`] packages the same check, perform, record flow and only
//! records actions that succeeded.
//!
//! ## Channel Lifecycle
//!
//! A channel is retired exactly once, by whichever comes first:
//! - the subscription is closed or dropped
//! - the stream timeout elapses (5 minutes by default)
//! - the transport reports a write error through [`Subscription::fail`]
//! - a push cannot be delivered (subscriber gone or buffer full)
//!
//! A replaced channel stops receiving events but its stream stays open until
//! one of these fires for it. A retired or replaced channel never removes its
//! successor from the registry.
//!
//! ## Calendar Days
//!
//! The daily quota counts per calendar day of the configured clock, not per
//! rolling 24 hours. An actor at quota at 23:59 may act again at 00:00.
//! Stale per-day counters are ignored on read and removed by
//! [`ActionRateLimiter::compact`], which [`Compactor`] can run periodically:
//!
//! ```rust,no_run
//! # async fn run() {
//! use pulse_guard::{ActionRateLimiter, Compactor, CompactorConfig};
//!
//! let limiter = ActionRateLimiter::with_defaults();
//! let handle = Compactor::new(limiter.clone(), CompactorConfig::default()).start();
//!
//! // ... serve requests ...
//!
//! handle.shutdown().await.expect("shutdown failed");
//! # }
//! ```
//!
//! ## Observability
//!
//! Both components log through `tracing` with structured fields and keep
//! atomic counters:
//!
//! ```rust
//! # use pulse_guard::ActionRateLimiter;
//! # let limiter = ActionRateLimiter::with_defaults();
//! let snapshot = limiter.metrics().snapshot();
//! println!("Denial rate: {:.2}%", snapshot.denial_rate() * 100.0);
//! ```

// Domain layer - pure types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    admission::{Admission, CooldownEntry, DailyQuota, Denial, QuotaKey},
    channel::{ChannelId, ChannelState, RetireReason},
    event::{ChannelEvent, ConnectedPayload, PaymentUpdate, CONNECTED_EVENT, PAYMENT_EVENT},
};

pub use application::{
    compactor::{Compactor, CompactorConfig, CompactorConfigError, CompactorHandle, ShutdownError},
    guard::{ActionGuard, GuardError},
    limiter::{ActionRateLimiter, CompactionReport, LimiterConfig},
    metrics::{ChannelMetrics, ChannelMetricsSnapshot, LimiterMetrics, LimiterMetricsSnapshot},
    ports::{Clock, Storage},
    registry::{
        Channel, ChannelConfig, ChannelError, EventChannelRegistry, PushOutcome, Subscription,
    },
};

pub use infrastructure::{
    builder::{
        BuildError, InMemoryChannelRegistry, InMemoryRateLimiter, LimiterBuilder, RegistryBuilder,
    },
    clock::SystemClock,
    storage::ShardedStorage,
};
