//! Review submission guarded by a cooldown and a daily quota.
//!
//! Uses a mock clock to walk through a day of review attempts without
//! waiting in real time.

use pulse_guard::infrastructure::mocks::MockClock;
use pulse_guard::{ActionGuard, ActionRateLimiter, Clock, GuardError};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Review Limits Example ===\n");
    println!("Policy: one review per minute, at most 3 per day\n");

    let clock = MockClock::utc(2024, 9, 1, 21, 0, 0);
    let limiter = ActionRateLimiter::builder()
        .with_cooldown(Duration::from_secs(60))
        .with_daily_max(3)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("valid configuration");
    let guard = ActionGuard::new(limiter.clone());

    let attempts = [
        (0, "Fast shipping"),
        (20, "Also: great packaging"),
        (60, "Update: works well"),
        (600, "Still happy"),
        (600, "One more thing"),
    ];

    for (wait_secs, text) in attempts {
        clock.advance(Duration::from_secs(wait_secs));
        let result: Result<(), GuardError<std::convert::Infallible>> =
            guard.run("user-7", || {
                println!("  saved review: {:?}", text);
                Ok(())
            });

        match result {
            Ok(()) => println!(
                "[{}] accepted, {} left today",
                clock.now().format("%H:%M:%S"),
                limiter.remaining_daily_quota("user-7")
            ),
            Err(GuardError::Denied(denial)) => {
                println!("[{}] rejected: {}", clock.now().format("%H:%M:%S"), denial)
            }
            Err(GuardError::Action(never)) => match never {},
        }
    }

    // Past midnight the quota starts over.
    clock.set(MockClock::utc(2024, 9, 2, 0, 0, 1).now());
    println!(
        "\nNext day: can act = {}, {} left",
        limiter.can_act("user-7"),
        limiter.remaining_daily_quota("user-7")
    );

    let report = limiter.compact_now();
    println!("Compaction removed {} entries", report.total());
    println!("Metrics: {:?}", limiter.metrics().snapshot());
    println!("\n=== Example Complete ===");
}
