//! Optimistic-concurrency retry.

use std::future::Future;
use std::time::Duration;

use crate::command::CommandContext;
use crate::error::DomainError;

/// Bounded exponential backoff applied between attempts that ended in a
/// version conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Grows by `multiplier` per attempt and is capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Runs `op` until it succeeds, fails with anything other than a version
/// conflict, or runs out of attempts.
///
/// `op` receives the 1-based attempt number and must redo the whole
/// load -> decide -> save cycle each time, since a conflict means the state
/// it decided on is stale. The context deadline bounds the whole loop,
/// backoff sleeps included; when it passes, the in-flight attempt is dropped
/// and [`DomainError::DeadlineExceeded`] is returned.
pub async fn with_optimistic_retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &CommandContext,
    mut op: F,
) -> Result<T, DomainError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    let attempts = async {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_version_conflict() => {
                    metrics::counter!("command_version_conflicts_total").increment(1);

                    if attempt >= max_attempts {
                        metrics::counter!("command_retries_exhausted_total").increment(1);
                        tracing::error!(attempts = attempt, error = %e, "retries exhausted");
                        return Err(DomainError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "version conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    };

    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, attempts)
            .await
            .map_err(|_| DomainError::DeadlineExceeded)?,
        None => attempts.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, AggregateKey};
    use event_store::{EventStoreError, Version};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> DomainError {
        DomainError::EventStore(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new("location", AggregateKey::new("t1", "l1")),
            expected: Version::new(1),
            actual: Version::new(2),
        })
    }

    #[test]
    fn delays_grow_until_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(50), Duration::from_millis(500));
        let delays: Vec<_> = (1..=6).map(|a| policy.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![50, 100, 200, 400, 500, 500]);
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_conflicts() {
        let calls = AtomicU32::new(0);
        let result = with_optimistic_retry(
            &RetryPolicy::default(),
            &CommandContext::new(),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(conflict())
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(4, Duration::from_millis(10), Duration::from_secs(1));

        let result: Result<(), _> =
            with_optimistic_retry(&policy, &CommandContext::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(conflict()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(DomainError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.is_version_conflict());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_optimistic_retry(
            &RetryPolicy::default(),
            &CommandContext::new(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(DomainError::EventStore(EventStoreError::InvalidAppend(
                        "broken".into(),
                    )))
                }
            },
        )
        .await;

        assert!(matches!(result, Err(DomainError::EventStore(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_the_retry_loop() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1), Duration::from_secs(1));
        let ctx = CommandContext::new().with_timeout(Duration::from_millis(2500));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_optimistic_retry(&policy, &ctx, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(conflict()) }
        })
        .await;

        assert!(matches!(result, Err(DomainError::DeadlineExceeded)));
        // attempts at t=0s, 1s, 2s; the deadline fires during the third sleep
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
