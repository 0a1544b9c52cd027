//! Resilience policies for calls leaving the process.
//!
//! A [`Policy`] combines a bounded [`retry`] loop with a shared
//! [`circuit::CircuitBreaker`]. Every attempt asks the breaker for permission
//! and reports its outcome back, so a dependency that keeps failing is cut off
//! for a cool-down period instead of being hammered by retries.
//!
//! Errors decide for themselves whether they are worth retrying through the
//! [`Transient`] trait. Non-transient errors (a 404, a malformed payload) end
//! the call immediately and do not count against the breaker.

pub mod circuit;
pub mod retry;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub use circuit::{BreakerConfig, CircuitBreaker, CircuitState, Permit};
pub use retry::RetryConfig;

/// Classification hook for errors returned by guarded operations.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    #[error("circuit '{0}' is open")]
    Open(String),

    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    #[error(transparent)]
    Rejected(E),

    #[error("no answer within {}ms", .0.as_millis())]
    DeadlineExceeded(Duration),
}

/// Retry loop plus circuit breaker around one downstream dependency.
#[derive(Debug)]
pub struct Policy {
    retry: RetryConfig,
    breaker: CircuitBreaker,
    deadline: Option<Duration>,
}

impl Policy {
    pub fn new(name: impl Into<String>, retry: RetryConfig, breaker: BreakerConfig) -> Self {
        Self {
            retry,
            breaker: CircuitBreaker::new(name, breaker),
            deadline: None,
        }
    }

    /// Bound the whole call, retries and backoff included.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `op` under the policy, re-invoking it for transient failures.
    ///
    /// An attempt cut short by the deadline is abandoned; if it was the
    /// half-open trial the circuit re-opens.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(deadline) = self.deadline else {
            return self.attempt_all(op).await;
        };

        match tokio::time::timeout(deadline, self.attempt_all(op)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    breaker = %self.breaker.name(),
                    deadline_ms = deadline.as_millis() as u64,
                    "deadline exceeded"
                );
                Err(ResilienceError::DeadlineExceeded(deadline))
            }
        }
    }

    async fn attempt_all<T, E, F, Fut>(&self, mut op: F) -> Result<T, ResilienceError<E>>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.retry.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let Some(permit) = self.breaker.try_acquire() else {
                tracing::warn!(breaker = %self.breaker.name(), attempt, "call not permitted");
                return Err(ResilienceError::Open(self.breaker.name().to_string()));
            };

            let err = match op().await {
                Ok(value) => {
                    permit.success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                // The dependency answered; it just said no.
                permit.success();
                return Err(ResilienceError::Rejected(err));
            }

            permit.failure();
            if attempt >= attempts {
                tracing::error!(
                    breaker = %self.breaker.name(),
                    attempts,
                    error = %err,
                    "retries exhausted"
                );
                return Err(ResilienceError::Exhausted {
                    attempts,
                    source: err,
                });
            }

            let delay = self.retry.backoff(attempt);
            tracing::warn!(
                breaker = %self.breaker.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    enum FakeError {
        Flaky,
        Missing,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                FakeError::Flaky => write!(f, "flaky"),
                FakeError::Missing => write!(f, "missing"),
            }
        }
    }

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, FakeError::Flaky)
        }
    }

    fn policy(max_attempts: u32, failure_threshold: u32) -> Policy {
        Policy::new(
            "fake",
            RetryConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                multiplier: 1.0,
                max_backoff: Duration::from_millis(1),
            },
            BreakerConfig {
                failure_threshold,
                open_duration: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let policy = policy(3, 10);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = policy
            .call(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FakeError::Flaky)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(policy.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = policy(3, 10);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = policy
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Flaky)
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let policy = policy(3, 1);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = policy
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Missing)
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Rejected(FakeError::Missing))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_calling() {
        let policy = policy(2, 2);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let first: Result<(), _> = policy
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Flaky)
            })
            .await;
        assert!(matches!(first, Err(ResilienceError::Exhausted { .. })));
        assert_eq!(policy.breaker().state(), CircuitState::Open);

        let second: Result<(), _> = policy
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), FakeError>(())
            })
            .await;

        assert!(matches!(second, Err(ResilienceError::Open(name)) if name == "fake"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_trial_does_not_wedge_the_breaker() {
        let policy = Policy::new(
            "fake",
            RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
            BreakerConfig {
                failure_threshold: 1,
                open_duration: Duration::from_millis(20),
            },
        );

        let opened: Result<(), _> = policy.call(|| async { Err(FakeError::Flaky) }).await;
        assert!(matches!(opened, Err(ResilienceError::Exhausted { .. })));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(5),
            policy.call(std::future::pending::<Result<(), FakeError>>),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(policy.breaker().state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let healthy = policy.call(|| async { Ok::<_, FakeError>("back") }).await;
        assert_eq!(healthy.unwrap(), "back");
        assert_eq!(policy.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn deadline_bounds_retries_and_backoff() {
        let policy = Policy::new(
            "fake",
            RetryConfig {
                max_attempts: 5,
                initial_backoff: Duration::from_secs(1),
                multiplier: 1.0,
                max_backoff: Duration::from_secs(1),
            },
            BreakerConfig::default(),
        )
        .with_deadline(Duration::from_millis(50));
        assert_eq!(policy.deadline(), Some(Duration::from_millis(50)));

        let started = std::time::Instant::now();
        let result: Result<(), _> = policy.call(|| async { Err(FakeError::Flaky) }).await;

        assert!(matches!(result, Err(ResilienceError::DeadlineExceeded(limit)) if limit == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
