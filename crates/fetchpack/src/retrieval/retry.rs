//! Retry policy for a single object
//!
//! Wraps one fetch in bounded attempts with linear backoff: after failed
//! attempt `n` the policy waits `base_delay * n` before trying again. The
//! shared cancellation token is checked before every attempt and interrupts
//! the wait between attempts. The policy holds no per-object state, every
//! call starts from a fresh attempt counter.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::retrieval::config::RetrievalConfig;
use crate::retrieval::core::{Result, RetrievalError};

/// Value produced by a successful attempt and the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved<T> {
    pub value: T,
    pub attempts: usize,
}

/// Terminal result of a retried operation that did not succeed
#[derive(Debug)]
pub enum RetryError {
    /// Every attempt failed; carries the last failure
    Exhausted {
        attempts: usize,
        last_error: RetrievalError,
    },
    /// The cancellation token fired before the operation could succeed
    Cancelled { attempts: usize },
}

impl RetryError {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

enum AttemptError {
    Failed(RetrievalError),
    Cancelled,
}

/// Bounded attempts with linear backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; values below 1 are raised to 1
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            attempt_timeout: None,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_attempts_per_object, config.retry_base_delay)
    }

    /// Fail any single attempt that runs longer than `timeout`
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Waits between consecutive attempts: `base`, `2 * base`, ...
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let base = self.base_delay;
        (1..self.max_attempts).map(move |n| base.saturating_mul(n as u32))
    }

    /// Run `operation` until it succeeds, attempts run out, or `cancel` fires
    ///
    /// `identifier` is only used for log fields and timeout errors.
    pub async fn attempt<F, Fut, T>(
        &self,
        identifier: &str,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> std::result::Result<Retrieved<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicUsize::new(0);
        let max_attempts = self.max_attempts;
        let attempt_timeout = self.attempt_timeout;

        let action = || {
            let next = if cancel.is_cancelled() {
                None
            } else {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                Some((attempt, operation()))
            };

            async move {
                let Some((attempt, fut)) = next else {
                    return Err(AttemptError::Cancelled);
                };
                debug!(identifier, attempt, max_attempts, "Starting attempt");

                let result = match attempt_timeout {
                    Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                        Err(RetrievalError::Timeout {
                            identifier: identifier.to_string(),
                            duration_ms: limit.as_millis() as u64,
                        })
                    }),
                    None => fut.await,
                };

                result.map_err(|e| {
                    warn!(
                        identifier,
                        attempt,
                        max_attempts,
                        category = e.category(),
                        "Attempt failed: {}",
                        e
                    );
                    AttemptError::Failed(e)
                })
            }
        };

        let retry = RetryIf::start(self.delays(), action, |e: &AttemptError| {
            matches!(e, AttemptError::Failed(_))
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            outcome = retry => outcome,
        };

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(value) => Ok(Retrieved { value, attempts }),
            Err(AttemptError::Cancelled) => Err(RetryError::Cancelled { attempts }),
            Err(AttemptError::Failed(last_error)) => Err(RetryError::Exhausted { attempts, last_error }),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn failure(reason: &str) -> RetrievalError {
        RetrievalError::Fetch {
            identifier: "obj".to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::new(4, Duration::from_millis(500));
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(500), Duration::from_millis(1000), Duration::from_millis(1500)]
        );
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_allowed_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let result = policy
            .attempt(
                "obj",
                || {
                    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if call < 3 { Err(failure("flaky")) } else { Ok(call) }
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result, Retrieved { value: 3, attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_surface_last_reason() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let calls = AtomicUsize::new(0);

        let err = policy
            .attempt(
                "obj",
                || {
                    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err::<(), _>(failure(&format!("failure {call}"))) }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            RetryError::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(last_error.to_string().contains("failure 2"));
            }
            other => panic!("Expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff_wait() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            }
        };
        let attempt = policy.attempt(
            "obj",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(failure("down")) }
            },
            &cancel,
        );

        let started = Instant::now();
        let (result, ()) = tokio::join!(attempt, canceller);

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);

        let result = policy
            .attempt(
                "obj",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_and_is_retried() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1)).with_attempt_timeout(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);

        let err = policy
            .attempt(
                "slow-object",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<Result<()>>()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            RetryError::Exhausted { last_error: RetrievalError::Timeout { identifier, duration_ms }, .. } => {
                assert_eq!(identifier, "slow-object");
                assert_eq!(duration_ms, 5000);
            }
            other => panic!("Expected timeout exhaustion, got {other:?}"),
        }
    }
}
