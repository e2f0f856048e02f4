//! Integration tests for the per-key channel registry.

use pulse_guard::infrastructure::mocks::{MockCaptureLayer, MockClock};
use pulse_guard::{
    ChannelEvent, ChannelState, InMemoryChannelRegistry, PaymentUpdate, PushOutcome,
    CONNECTED_EVENT, PAYMENT_EVENT,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn registry(timeout: Duration) -> InMemoryChannelRegistry {
    InMemoryChannelRegistry::builder()
        .with_stream_timeout(timeout)
        .with_clock(Arc::new(MockClock::utc(2024, 6, 1, 9, 30, 0)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_confirmation_is_first_event() {
    let registry = registry(Duration::from_secs(300));
    let mut sub = registry.subscribe("ORD-100");
    registry.push("ORD-100", PAYMENT_EVENT, json!({"status": "PENDING"}));

    let first = sub.recv().await.unwrap();
    assert_eq!(first.name(), CONNECTED_EVENT);
    assert_eq!(first.data()["orderId"], "ORD-100");

    let second = sub.recv().await.unwrap();
    assert_eq!(second.data()["status"], "PENDING");
}

#[tokio::test]
async fn test_payment_update_frame() {
    let registry = registry(Duration::from_secs(300));
    let mut sub = registry.subscribe("ORD-101");
    let _connected = sub.recv().await.unwrap();

    registry
        .push_payment_update("ORD-101", "FAILED", "Card declined", None)
        .unwrap();

    let event = sub.recv().await.unwrap();
    let update: PaymentUpdate = event.decode().unwrap();
    assert_eq!(update.transaction_id, "");

    let frame = event.to_sse_frame();
    assert!(frame.starts_with("event: payment\ndata: {"));
    assert!(frame.contains("\"orderId\":\"ORD-101\""));
    assert!(frame.contains("\"transactionId\":\"\""));
    assert!(frame.ends_with("}\n\n"));
}

#[tokio::test(start_paused = true)]
async fn test_last_subscriber_wins() {
    let registry = registry(Duration::from_secs(300));
    let start = tokio::time::Instant::now();
    let mut old = registry.subscribe("ORD-102");
    tokio::time::sleep(Duration::from_secs(100)).await;
    let mut new = registry.subscribe("ORD-102");

    registry.push("ORD-102", PAYMENT_EVENT, json!("only-new"));

    assert_eq!(new.recv().await.unwrap().name(), CONNECTED_EVENT);
    assert_eq!(new.recv().await.unwrap().data(), &json!("only-new"));

    // The replaced stream gets nothing more but is not closed early.
    assert_eq!(old.recv().await.unwrap().name(), CONNECTED_EVENT);
    assert!(old.try_recv().is_none());
    assert_eq!(old.state(), ChannelState::Open);

    // It ends at its own timeout, leaving the successor in place.
    assert!(old.recv().await.is_none());
    assert!(start.elapsed() >= Duration::from_secs(300));
    assert_eq!(old.state(), ChannelState::Retired);
    assert!(registry.has_subscriber("ORD-102"));
    assert_eq!(
        registry.push("ORD-102", PAYMENT_EVENT, json!(2)),
        PushOutcome::Delivered
    );
}

#[tokio::test(start_paused = true)]
async fn test_stream_times_out() {
    let registry = registry(Duration::from_secs(300));
    let start = tokio::time::Instant::now();
    let mut sub = registry.subscribe("ORD-103");
    let _connected = sub.recv().await.unwrap();

    // Ends only when the watchdog retires the channel.
    assert!(sub.recv().await.is_none());

    assert!(start.elapsed() >= Duration::from_secs(300));
    assert_eq!(sub.state(), ChannelState::Retired);
    assert!(!registry.has_subscriber("ORD-103"));
    assert_eq!(
        registry.push("ORD-103", PAYMENT_EVENT, json!({})),
        PushOutcome::NoSubscriber
    );
}

#[tokio::test(start_paused = true)]
async fn test_stream_stays_open_before_timeout() {
    let registry = registry(Duration::from_secs(300));
    let _sub = registry.subscribe("ORD-104");

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert!(registry.has_subscriber("ORD-104"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!registry.has_subscriber("ORD-104"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_of_replaced_channel_keeps_successor() {
    let registry = registry(Duration::from_secs(300));
    let first = registry.subscribe("ORD-105");

    tokio::time::sleep(Duration::from_secs(100)).await;
    let _second = registry.subscribe("ORD-105");

    // First channel's timeout fires at 300s; the second is due at 400s.
    tokio::time::sleep(Duration::from_secs(250)).await;
    assert_eq!(first.state(), ChannelState::Retired);
    assert!(registry.has_subscriber("ORD-105"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!registry.has_subscriber("ORD-105"));
    assert_eq!(registry.metrics().channels_retired(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_timeout() {
    let capture = MockCaptureLayer::new();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let registry = registry(Duration::from_secs(300));
    let sub = registry.subscribe("ORD-106");
    sub.close();

    tokio::time::sleep(Duration::from_secs(600)).await;

    let retired = capture.matching(Level::INFO, "channel retired");
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].field("reason"), Some("completed"));
    assert_eq!(registry.metrics().channels_retired(), 1);
}

#[tokio::test]
async fn test_transport_error_retires_channel() {
    let capture = MockCaptureLayer::new();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let registry = registry(Duration::from_secs(300));
    let sub = registry.subscribe("ORD-107");
    sub.fail("connection reset by peer");

    assert!(!registry.has_subscriber("ORD-107"));
    let retired = capture.matching(Level::WARN, "channel retired");
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].field("reason"), Some("errored"));
    assert_eq!(retired[0].field("key"), Some("ORD-107"));
}

#[tokio::test]
async fn test_unread_buffer_overflow_retires() {
    let registry = registry(Duration::from_secs(300));
    let sub = registry.subscribe("ORD-108");
    let id = sub.id();
    // Leak the handle so the channel stays registered while nobody reads it.
    std::mem::forget(sub);

    // The confirmation already occupies one slot.
    for _ in 0..31 {
        assert_eq!(
            registry.push("ORD-108", PAYMENT_EVENT, json!(1)),
            PushOutcome::Delivered
        );
    }
    assert_eq!(
        registry.push("ORD-108", PAYMENT_EVENT, json!(1)),
        PushOutcome::Retired
    );
    assert!(!registry.has_subscriber("ORD-108"));

    let next = registry.subscribe("ORD-108");
    assert_ne!(next.id(), id);
}

#[tokio::test]
async fn test_push_without_subscriber_logs_info() {
    let capture = MockCaptureLayer::new();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let registry = registry(Duration::from_secs(300));
    let outcome = registry.push_event("ORD-404", ChannelEvent::new(PAYMENT_EVENT, json!({})));

    assert_eq!(outcome, PushOutcome::NoSubscriber);
    let dropped = capture.matching(Level::INFO, "no subscriber");
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].field("key"), Some("ORD-404"));
}

#[test]
fn test_subscribe_outside_runtime_warns() {
    let capture = MockCaptureLayer::new();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let registry = registry(Duration::from_secs(300));
    let mut sub = registry.subscribe("ORD-109");

    assert_eq!(sub.try_recv().unwrap().name(), CONNECTED_EVENT);
    assert_eq!(
        capture
            .matching(Level::WARN, "stream timeout not armed")
            .len(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_keys_are_independent() {
    let registry = registry(Duration::from_secs(300));
    let mut subs: Vec<_> = (0..16)
        .map(|i| registry.subscribe(format!("ORD-{}", i)))
        .collect();

    let mut tasks = vec![];
    for i in 0..16 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("ORD-{}", i);
            for n in 0..10 {
                assert_eq!(
                    registry.push(&key, PAYMENT_EVENT, json!(n)),
                    PushOutcome::Delivered
                );
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for (i, sub) in subs.iter_mut().enumerate() {
        assert_eq!(sub.key(), format!("ORD-{}", i));
        assert_eq!(sub.recv().await.unwrap().name(), CONNECTED_EVENT);
        for n in 0..10 {
            assert_eq!(sub.recv().await.unwrap().data(), &json!(n));
        }
    }
    assert_eq!(registry.active_count(), 16);
    assert_eq!(registry.metrics().events_delivered(), 16 * 11);
}
