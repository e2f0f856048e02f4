//! Registry of per-key push channels.
//!
//! The registry maps a subject key (typically an order id) to at most one
//! live [`Channel`]. A subscriber receives events through the
//! [`Subscription`] handle returned by [`EventChannelRegistry::subscribe`];
//! producers in unrelated request contexts push named events by key.
//!
//! Every channel instance ends through a single finalize path, whichever of
//! these fires first:
//! - completion: the subscription is closed or dropped
//! - timeout: the stream outlives [`ChannelConfig::stream_timeout`]
//! - error: the outer transport reports a write failure via [`Subscription::fail`]
//! - send failure: a push cannot hand its event to the subscriber
//!
//! Finalization runs at most once per instance and only removes the map entry
//! if it still belongs to that instance, so a late trigger on a replaced
//! channel never evicts its successor.

use crate::application::metrics::ChannelMetrics;
use crate::application::ports::{Clock, Storage};
use crate::domain::channel::{ChannelId, ChannelState, RetireReason};
use crate::domain::event::{
    ChannelEvent, ConnectedPayload, PaymentUpdate, CONNECTED_EVENT, PAYMENT_EVENT,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Default lifetime of a subscription stream.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default number of undelivered events a subscription may buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32;

/// Default text of the `connected` confirmation.
pub const DEFAULT_CONNECTED_MESSAGE: &str = "Connected to order updates";

/// Configuration for the channel registry.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long a stream may stay open before it is retired
    pub stream_timeout: Duration,
    /// Capacity of each subscription's event buffer
    pub buffer_capacity: usize,
    /// Message carried by the `connected` confirmation event
    pub connected_message: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            connected_message: DEFAULT_CONNECTED_MESSAGE.to_string(),
        }
    }
}

/// Error returned when an event payload cannot be built.
#[derive(Debug)]
pub enum ChannelError {
    /// The payload could not be serialized to JSON
    Encode(serde_json::Error),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Encode(e) => write!(f, "failed to encode event payload: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Encode(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Encode(e)
    }
}

/// Result of a push.
///
/// None of these is an error: a missing subscriber is a normal race between
/// producer and consumer lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The event was handed to the live subscriber
    Delivered,
    /// No live subscriber exists for the key
    NoSubscriber,
    /// Delivery failed and the channel was retired
    Retired,
}

impl PushOutcome {
    /// Returns true if the event reached a subscriber.
    pub fn is_delivered(&self) -> bool {
        matches!(self, PushOutcome::Delivered)
    }
}

/// Lifecycle state shared by a registry entry, its subscription handle and
/// its timeout watchdog.
///
/// Holds the owning sender of the stream. The stream stays open until this
/// instance retires, even after its registry entry has been replaced.
#[derive(Debug)]
struct Lifecycle {
    id: ChannelId,
    key: String,
    retired: AtomicBool,
    retired_signal: Notify,
    stream: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
}

impl Lifecycle {
    fn new(id: ChannelId, key: String, sender: mpsc::Sender<ChannelEvent>) -> Self {
        Self {
            id,
            key,
            retired: AtomicBool::new(false),
            retired_signal: Notify::new(),
            stream: Mutex::new(Some(sender)),
        }
    }

    /// Claim the right to retire this instance. Only the first caller wins,
    /// and it releases the owning sender.
    fn begin_retirement(&self) -> bool {
        let won = self
            .retired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            let sender = match self.stream.lock() {
                Ok(mut stream) => stream.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            drop(sender);
        }
        won
    }

    fn state(&self) -> ChannelState {
        if self.retired.load(Ordering::Acquire) {
            ChannelState::Retired
        } else {
            ChannelState::Open
        }
    }
}

/// Registry entry for one subject key.
///
/// Only routes events: dropping or replacing the entry leaves the stream open
/// until the instance itself retires.
#[derive(Debug)]
pub struct Channel {
    lifecycle: Arc<Lifecycle>,
    sender: mpsc::Sender<ChannelEvent>,
}

impl Channel {
    /// Identity of this channel instance.
    pub fn id(&self) -> ChannelId {
        self.lifecycle.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }
}

/// The single finalize path every terminal trigger funnels into.
trait Finalize: Send + Sync {
    fn finalize(&self, lifecycle: &Lifecycle, reason: RetireReason) -> bool;
}

struct RegistryInner<S> {
    storage: S,
    clock: Arc<dyn Clock>,
    config: ChannelConfig,
    metrics: ChannelMetrics,
    next_id: AtomicU64,
}

impl<S> Finalize for RegistryInner<S>
where
    S: Storage<String, Channel>,
{
    fn finalize(&self, lifecycle: &Lifecycle, reason: RetireReason) -> bool {
        if !lifecycle.begin_retirement() {
            return false;
        }
        lifecycle.retired_signal.notify_one();

        let removed = self
            .storage
            .remove_if(&lifecycle.key, |channel| channel.id() == lifecycle.id)
            .is_some();
        self.metrics.record_retired();

        match reason {
            RetireReason::Errored | RetireReason::SendFailed => warn!(
                key = %lifecycle.key,
                channel_id = %lifecycle.id,
                reason = %reason,
                removed,
                "channel retired"
            ),
            RetireReason::Completed | RetireReason::TimedOut => info!(
                key = %lifecycle.key,
                channel_id = %lifecycle.id,
                reason = %reason,
                removed,
                "channel retired"
            ),
        }
        true
    }
}

/// Registry managing at most one live push channel per key.
///
/// Cloning is cheap and yields a handle to the same registry.
///
/// This type is generic over the storage implementation. In production, use
/// `Arc<ShardedStorage<String, Channel>>` (see `EventChannelRegistry::builder`).
pub struct EventChannelRegistry<S>
where
    S: Storage<String, Channel> + 'static,
{
    inner: Arc<RegistryInner<S>>,
}

impl<S> Clone for EventChannelRegistry<S>
where
    S: Storage<String, Channel> + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for EventChannelRegistry<S>
where
    S: Storage<String, Channel> + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannelRegistry")
            .field("active", &self.inner.storage.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<S> EventChannelRegistry<S>
where
    S: Storage<String, Channel> + 'static,
{
    /// Create a new registry with storage, clock and configuration.
    ///
    /// A zero buffer capacity is raised to one.
    pub fn new(storage: S, clock: Arc<dyn Clock>, mut config: ChannelConfig) -> Self {
        config.buffer_capacity = config.buffer_capacity.max(1);
        Self {
            inner: Arc::new(RegistryInner {
                storage,
                clock,
                config,
                metrics: ChannelMetrics::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a channel for `key`, replacing any existing one.
    ///
    /// The returned subscription already holds a `connected` event carrying
    /// the key. A replaced channel is not notified or closed: it stops
    /// receiving events but its stream stays open until its own timeout,
    /// close or failure, and that termination leaves the new channel
    /// untouched.
    ///
    /// When called inside a Tokio runtime, a watchdog retires the channel
    /// after the configured stream timeout.
    pub fn subscribe(&self, key: impl Into<String>) -> Subscription {
        let key = key.into();
        let id = ChannelId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.config.buffer_capacity);
        let lifecycle = Arc::new(Lifecycle::new(id, key.clone(), sender.clone()));
        let finalizer: Weak<dyn Finalize> = Arc::downgrade(&self.inner) as Weak<dyn Finalize>;
        let subscription = Subscription {
            lifecycle: Arc::clone(&lifecycle),
            receiver,
            finalizer,
        };
        self.inner.metrics.record_opened();

        // The confirmation goes out before the channel becomes routable so it
        // is always the first event the subscriber sees.
        let confirmation = ConnectedPayload {
            message: self.inner.config.connected_message.clone(),
            order_id: key.clone(),
        };
        let sent = ChannelEvent::from_payload(CONNECTED_EVENT, &confirmation)
            .map_err(|e| e.to_string())
            .and_then(|event| sender.try_send(event).map_err(|e| e.to_string()));
        if let Err(cause) = sent {
            warn!(key = %key, channel_id = %id, cause = %cause, "failed to send connection confirmation");
            self.inner.finalize(&lifecycle, RetireReason::SendFailed);
            return subscription;
        }
        self.inner.metrics.record_delivered();

        let channel = Channel {
            lifecycle: Arc::clone(&lifecycle),
            sender,
        };
        match self.inner.storage.insert(key.clone(), channel) {
            Some(previous) => info!(
                key = %key,
                channel_id = %id,
                replaced = %previous.id(),
                "channel subscribed, replacing previous subscriber"
            ),
            None => info!(key = %key, channel_id = %id, "channel subscribed"),
        }

        self.arm_timeout(&lifecycle);
        subscription
    }

    fn arm_timeout(&self, lifecycle: &Arc<Lifecycle>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    key = %lifecycle.key,
                    channel_id = %lifecycle.id,
                    "no async runtime, stream timeout not armed"
                );
                return;
            }
        };

        let registry = Arc::downgrade(&self.inner);
        let lifecycle = Arc::clone(lifecycle);
        let timeout = self.inner.config.stream_timeout;
        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    if let Some(registry) = registry.upgrade() {
                        registry.finalize(&lifecycle, RetireReason::TimedOut);
                    }
                }
                _ = lifecycle.retired_signal.notified() => {}
            }
        });
    }

    /// Push a named event with a JSON payload to the subscriber of `key`.
    ///
    /// Never waits for the subscriber: a full buffer counts as a delivery
    /// failure and retires the channel.
    pub fn push(&self, key: &str, name: &str, payload: serde_json::Value) -> PushOutcome {
        self.push_event(key, ChannelEvent::new(name, payload))
    }

    /// Push a prebuilt event to the subscriber of `key`.
    pub fn push_event(&self, key: &str, event: ChannelEvent) -> PushOutcome {
        let target = self.inner.storage.with_entry(&key.to_string(), |channel| {
            (channel.sender.clone(), Arc::clone(&channel.lifecycle))
        });

        let (sender, lifecycle) = match target {
            Some((sender, lifecycle)) if lifecycle.state().is_open() => (sender, lifecycle),
            _ => {
                self.inner.metrics.record_unrouted();
                info!(key, event = event.name(), "no subscriber for key, event dropped");
                return PushOutcome::NoSubscriber;
            }
        };

        match sender.try_send(event) {
            Ok(()) => {
                self.inner.metrics.record_delivered();
                debug!(key, channel_id = %lifecycle.id, "event delivered");
                PushOutcome::Delivered
            }
            Err(err) => {
                let cause = match err {
                    TrySendError::Full(_) => "buffer full",
                    TrySendError::Closed(_) => "subscriber gone",
                };
                warn!(key, channel_id = %lifecycle.id, cause, "failed to deliver event");
                self.inner.finalize(&lifecycle, RetireReason::SendFailed);
                PushOutcome::Retired
            }
        }
    }

    /// Push a `payment` status update for an order.
    ///
    /// The payload carries the order id, status, message, the transaction id
    /// (empty when absent) and the current clock time in epoch milliseconds.
    ///
    /// # Errors
    /// Returns `ChannelError::Encode` if the payload cannot be serialized.
    pub fn push_payment_update(
        &self,
        order_id: &str,
        status: &str,
        message: &str,
        transaction_id: Option<&str>,
    ) -> Result<PushOutcome, ChannelError> {
        info!(order_id, status, "pushing payment update");
        let timestamp = self.inner.clock.now().timestamp_millis();
        let update = PaymentUpdate::new(order_id, status, message, transaction_id, timestamp);
        let event = ChannelEvent::from_payload(PAYMENT_EVENT, &update)?;
        Ok(self.push_event(order_id, event))
    }

    /// Number of live channels. May be stale by the time it is read.
    pub fn active_count(&self) -> usize {
        self.inner.storage.len()
    }

    /// Whether `key` currently has a live channel.
    pub fn has_subscriber(&self, key: &str) -> bool {
        self.inner.storage.contains_key(&key.to_string())
    }

    /// Keys with a live channel, in no particular order.
    pub fn active_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.inner.storage.len());
        self.inner.storage.for_each(|key, _| keys.push(key.clone()));
        keys
    }

    /// Get the registry configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &ChannelMetrics {
        &self.inner.metrics
    }
}

/// Receiving end of a channel.
///
/// Dropping the handle completes the channel.
pub struct Subscription {
    lifecycle: Arc<Lifecycle>,
    receiver: mpsc::Receiver<ChannelEvent>,
    finalizer: Weak<dyn Finalize>,
}

impl Subscription {
    /// The subject key this subscription listens on.
    pub fn key(&self) -> &str {
        &self.lifecycle.key
    }

    /// Identity of the underlying channel instance.
    pub fn id(&self) -> ChannelId {
        self.lifecycle.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the channel has been retired and every buffered
    /// event has been received. A replaced channel keeps waiting until it
    /// retires.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.try_recv().ok()
    }

    /// Complete the channel.
    pub fn close(self) {
        self.finish(RetireReason::Completed);
    }

    /// Retire the channel because the outer transport failed to write.
    pub fn fail(self, error: impl fmt::Display) {
        warn!(key = %self.lifecycle.key, channel_id = %self.lifecycle.id, error = %error, "stream transport error");
        self.finish(RetireReason::Errored);
    }

    fn finish(&self, reason: RetireReason) -> bool {
        match self.finalizer.upgrade() {
            Some(registry) => registry.finalize(&self.lifecycle, reason),
            None => self.lifecycle.begin_retirement(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish(RetireReason::Completed);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.lifecycle.key)
            .field("id", &self.lifecycle.id)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
