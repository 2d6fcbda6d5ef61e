//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use herald_core::config::RetryConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ActionError;
use crate::pacing::pause;

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T> {
    pub outcome: Result<T, ActionError>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
}

/// Retries transient failures up to `max_attempts` invocations in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between attempt `attempt` and `attempt + 1` (1-based):
    /// `base * 2^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts,
    /// or `cancel` fires during a backoff wait. `op` receives the 1-based
    /// attempt number.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActionError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Attempted {
                        outcome: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if !e.is_transient() => {
                    debug!(attempt, error = %e, "Permanent failure, not retrying");
                    return Attempted {
                        outcome: Err(e),
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(attempts = attempt, error = %e, "Retries exhausted");
                    return Attempted {
                        outcome: Err(ActionError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        }),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!(attempt, ?delay, error = %e, "Transient failure, backing off");
                    if !pause(delay, cancel).await {
                        return Attempted {
                            outcome: Err(ActionError::Cancelled),
                            attempts: attempt,
                        };
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let policy = RetryPolicy::default();
        let result = policy
            .execute(&CancellationToken::new(), |_| async { Ok::<_, ActionError>("done") })
            .await;
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_resolving_transient_error_tries_exactly_three_times() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let result: Attempted<()> = policy
            .execute(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ActionError::RateLimited) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.attempts, 3);
        match result.outcome {
            Err(ActionError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ActionError::RateLimited));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // 1s after the first failure, 2s after the second.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Attempted<()> = policy
            .execute(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ActionError::Reported("Missing Permissions".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts, 1);
        assert!(matches!(result.outcome, Err(ActionError::Reported(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_second_attempt() {
        let policy = RetryPolicy::default();
        let result = policy
            .execute(&CancellationToken::new(), |attempt| async move {
                if attempt == 1 {
                    Err(ActionError::Server {
                        status: 502,
                        message: "bad gateway".to_string(),
                    })
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default();
        let trigger = cancel.clone();

        let result: Attempted<()> = policy
            .execute(&cancel, |_| {
                trigger.cancel();
                async { Err(ActionError::Timeout(5)) }
            })
            .await;

        assert_eq!(result.attempts, 1);
        assert!(matches!(result.outcome, Err(ActionError::Cancelled)));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
        });
        assert_eq!(policy.max_attempts(), 1);
    }
}
