//! Check, perform, record.
//!
//! [`ActionGuard`] wraps a guarded action with the admission flow the limiter
//! expects: the action only runs when admitted, and only a successful action
//! is recorded.

use crate::application::limiter::ActionRateLimiter;
use crate::application::ports::Storage;
use crate::domain::admission::{Admission, CooldownEntry, DailyQuota, Denial, QuotaKey};
use std::fmt;
use std::future::Future;

/// Error returned by a guarded action.
#[derive(Debug)]
pub enum GuardError<E> {
    /// The limiter refused the actor; the action did not run
    Denied(Denial),
    /// The action ran and failed; nothing was recorded
    Action(E),
}

impl<E> GuardError<E> {
    /// The denial, if the action was refused.
    pub fn denial(&self) -> Option<Denial> {
        match self {
            GuardError::Denied(denial) => Some(*denial),
            GuardError::Action(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Denied(denial) => write!(f, "{}", denial),
            GuardError::Action(e) => write!(f, "guarded action failed: {}", e),
        }
    }
}

impl<E> std::error::Error for GuardError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::Denied(_) => None,
            GuardError::Action(e) => Some(e),
        }
    }
}

impl<E> From<Denial> for GuardError<E> {
    fn from(denial: Denial) -> Self {
        GuardError::Denied(denial)
    }
}

/// Runs actions under an [`ActionRateLimiter`].
#[derive(Debug, Clone)]
pub struct ActionGuard<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone,
    Q: Storage<QuotaKey, DailyQuota> + Clone,
{
    limiter: ActionRateLimiter<C, Q>,
}

impl<C, Q> ActionGuard<C, Q>
where
    C: Storage<String, CooldownEntry> + Clone,
    Q: Storage<QuotaKey, DailyQuota> + Clone,
{
    pub fn new(limiter: ActionRateLimiter<C, Q>) -> Self {
        Self { limiter }
    }

    /// Run `action` for `actor` if admitted, recording it on success.
    pub fn run<T, E, F>(&self, actor: &str, action: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.admit(actor)?;
        let value = action().map_err(GuardError::Action)?;
        self.limiter.record_action(actor);
        Ok(value)
    }

    /// Async form of [`run`](Self::run). The future is only polled when the
    /// actor is admitted.
    pub async fn run_async<T, E, Fut>(&self, actor: &str, action: Fut) -> Result<T, GuardError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit(actor)?;
        let value = action.await.map_err(GuardError::Action)?;
        self.limiter.record_action(actor);
        Ok(value)
    }

    fn admit(&self, actor: &str) -> Result<(), Denial> {
        match self.limiter.check(actor) {
            Admission::Allowed => Ok(()),
            Admission::Denied(denial) => Err(denial),
        }
    }

    /// Get a reference to the underlying limiter.
    pub fn limiter(&self) -> &ActionRateLimiter<C, Q> {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::limiter::LimiterConfig;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::storage::ShardedStorage;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::time::Duration;

    type TestGuard = ActionGuard<
        Arc<ShardedStorage<String, CooldownEntry>>,
        Arc<ShardedStorage<QuotaKey, DailyQuota>>,
    >;

    fn guard() -> (TestGuard, MockClock) {
        let clock = MockClock::utc(2024, 3, 10, 12, 0, 0);
        let limiter = ActionRateLimiter::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(ShardedStorage::new()),
            Arc::new(clock.clone()),
            LimiterConfig::default(),
        );
        (ActionGuard::new(limiter), clock)
    }

    #[test]
    fn test_successful_action_is_recorded() {
        let (guard, _clock) = guard();

        let result: Result<&str, GuardError<String>> = guard.run("alice", || Ok("review-1"));

        assert_eq!(result.unwrap(), "review-1");
        assert_eq!(guard.limiter().remaining_daily_quota("alice"), 9);
        assert!(!guard.limiter().can_act("alice"));
    }

    #[test]
    fn test_failed_action_is_not_recorded() {
        let (guard, _clock) = guard();

        let result: Result<(), GuardError<String>> =
            guard.run("alice", || Err("storage unavailable".to_string()));

        assert!(matches!(result, Err(GuardError::Action(ref e)) if e == "storage unavailable"));
        assert_eq!(guard.limiter().remaining_daily_quota("alice"), 10);
        assert!(guard.limiter().can_act("alice"));
    }

    #[test]
    fn test_denied_action_does_not_run() {
        let (guard, clock) = guard();
        guard.limiter().record_action("alice");
        clock.advance(Duration::from_secs(10));

        let ran = Cell::new(false);
        let result: Result<(), GuardError<String>> = guard.run("alice", || {
            ran.set(true);
            Ok(())
        });

        assert!(!ran.get());
        let err = result.unwrap_err();
        assert_eq!(
            err.denial(),
            Some(Denial::Cooldown {
                retry_after: Duration::from_secs(50)
            })
        );
        assert_eq!(err.to_string(), "please wait 1 minute before trying again");
    }

    #[tokio::test]
    async fn test_run_async() {
        let (guard, clock) = guard();

        let first: Result<u32, GuardError<String>> =
            guard.run_async("bob", async { Ok(7) }).await;
        assert_eq!(first.unwrap(), 7);

        let second: Result<u32, GuardError<String>> =
            guard.run_async("bob", async { Ok(8) }).await;
        assert!(matches!(second, Err(GuardError::Denied(Denial::Cooldown { .. }))));

        clock.advance(Duration::from_secs(60));
        let third: Result<u32, GuardError<String>> =
            guard.run_async("bob", async { Ok(9) }).await;
        assert_eq!(third.unwrap(), 9);
    }
}
