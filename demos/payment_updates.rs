//! Payment status updates pushed to a waiting client.
//!
//! A client opens a stream for its order while a simulated payment provider
//! reports progress from another task. Each event is printed as the
//! Server-Sent-Events frame an HTTP layer would write to the wire.

use pulse_guard::{EventChannelRegistry, PushOutcome};
use std::time::Duration;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Payment Updates Example ===\n");

    let registry = EventChannelRegistry::builder()
        .with_stream_timeout(Duration::from_secs(10))
        .build()
        .expect("valid configuration");

    let mut subscription = registry.subscribe("ORD-2024-0001");

    // Payment provider callbacks arrive on an unrelated task.
    let producer = registry.clone();
    let provider = tokio::spawn(async move {
        let steps = [
            ("PENDING", "Waiting for payment confirmation", None),
            ("PAID", "Payment confirmed", Some("TX-88231")),
        ];
        for (status, message, transaction_id) in steps {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let outcome = producer
                .push_payment_update("ORD-2024-0001", status, message, transaction_id)
                .expect("payment payload serializes");
            assert_eq!(outcome, PushOutcome::Delivered);
        }

        // Nobody listens on this order; the update is dropped.
        let outcome = producer
            .push_payment_update("ORD-2024-0002", "PAID", "Payment confirmed", None)
            .expect("payment payload serializes");
        println!("Push to unsubscribed order: {:?}\n", outcome);
    });

    // The client reads until the payment settles.
    while let Some(event) = subscription.recv().await {
        print!("{}", event.to_sse_frame());
        if event.data()["status"] == "PAID" {
            break;
        }
    }

    provider.await.expect("provider task");
    subscription.close();

    println!("Active channels after close: {}", registry.active_count());
    println!("Metrics: {:?}", registry.metrics().snapshot());
    println!("\n=== Example Complete ===");
}
