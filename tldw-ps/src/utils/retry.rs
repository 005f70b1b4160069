//! Retry Logic
//!
//! Implements bounded retries with exponential backoff and a wall-clock budget
//! for calls to flaky external collaborators (downloader, transcription API,
//! summarization API).

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors that know whether retrying could help
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why a retried operation gave up
///
/// Both variants keep the attempt count, the configured maximum and the total
/// elapsed time so callers can tell exhaustion from a blown budget.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Last attempt failed, or the error was not retryable
    #[error("{operation} failed after {attempts} of {max_attempts} attempts ({} ms): {last_error}", .elapsed.as_millis())]
    Exhausted {
        operation: String,
        attempts: u32,
        max_attempts: u32,
        elapsed: Duration,
        #[source]
        last_error: E,
    },

    /// Wall-clock budget ran out
    ///
    /// `last_error` holds the most recent failed attempt; `None` when the
    /// budget expired during the first attempt.
    #[error("{operation} timed out after {} ms (budget {} ms, {attempts} of {max_attempts} attempts)", .elapsed.as_millis(), .timeout.as_millis())]
    TimedOut {
        operation: String,
        attempts: u32,
        max_attempts: u32,
        elapsed: Duration,
        timeout: Duration,
        #[source]
        last_error: Option<E>,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            RetryError::Exhausted { elapsed, .. } | RetryError::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::TimedOut { .. })
    }
}

/// Retry configuration
///
/// Stateless: one policy can drive any number of concurrent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubles per attempt
    pub initial_delay: Duration,
    /// Cap on a single delay
    pub max_delay: Duration,
    /// Wall-clock budget for the whole run
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            timeout: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given failed attempt (1-based):
    /// `min(initial_delay * 2^(attempt-1), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `operation`, retrying errors that report themselves transient
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::error::Error + 'static,
    {
        self.run_if(operation_name, |err: &E| err.is_transient(), operation)
            .await
    }

    /// Run `operation`, retrying only errors accepted by `should_retry`
    ///
    /// **Algorithm:**
    /// 1. Attempt operation (bounded by the remaining budget)
    /// 2. If successful, return result
    /// 3. On failure:
    ///    a. If elapsed >= timeout: return `TimedOut`
    ///    b. If last attempt or `should_retry` is false: return `Exhausted`
    ///    c. Otherwise: log WARN, back off, retry
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        should_retry: P,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::error::Error + 'static,
    {
        let start_time = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        let mut last_error: Option<E> = None;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(operation = operation_name, attempt, "Retrying operation");
            }

            let remaining = self.timeout.saturating_sub(start_time.elapsed());
            let outcome = match tokio::time::timeout(remaining, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let elapsed = start_time.elapsed();
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        timeout_ms = self.timeout.as_millis(),
                        "Operation cut off: retry budget exhausted mid-attempt"
                    );
                    return Err(RetryError::TimedOut {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        max_attempts,
                        elapsed,
                        timeout: self.timeout,
                        last_error,
                    });
                }
            };

            match outcome {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    let elapsed = start_time.elapsed();

                    if elapsed >= self.timeout {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed.as_millis(),
                            timeout_ms = self.timeout.as_millis(),
                            error = %err,
                            "Operation failed: retry budget exceeded"
                        );
                        return Err(RetryError::TimedOut {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            max_attempts,
                            elapsed,
                            timeout: self.timeout,
                            last_error: Some(err),
                        });
                    }

                    let retryable = should_retry(&err);
                    if attempt >= max_attempts || !retryable {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            max_attempts,
                            retryable,
                            elapsed_ms = elapsed.as_millis(),
                            error = %err,
                            "Operation failed, giving up"
                        );
                        return Err(RetryError::Exhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            max_attempts,
                            elapsed,
                            last_error: err,
                        });
                    }

                    let backoff = self.delay_for_attempt(attempt);

                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        backoff_ms = backoff.as_millis(),
                        remaining_ms = self.timeout.saturating_sub(elapsed).as_millis(),
                        error = %err,
                        "Transient failure, will retry after backoff"
                    );

                    last_error = Some(err);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Error)]
    #[error("test error (transient: {0})")]
    struct TestError(bool);

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            timeout: Duration::from_millis(30_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_first_attempt() {
        let result = policy()
            .run("test_op", || async { Ok::<i32, TestError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_errors() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = policy()
            .run("test_op", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError(true))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = policy()
            .run("test_op", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError(true))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted {
                attempts,
                max_attempts,
                elapsed,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(max_attempts, 3);
                // 1000 ms + 2000 ms of backoff
                assert_eq!(elapsed, Duration::from_millis(3000));
                assert!(last_error.0);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = policy()
            .run("test_op", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError(false))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 1, .. })
        ));
        // No backoff sleep happened
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate_overrides_classification() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = policy()
            .run_if(
                "test_op",
                |_err: &TestError| true,
                || {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(TestError(false))
                    }
                },
            )
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_budget_is_timeout() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(500),
            ..policy()
        };

        let result = policy
            .run("slow_op", || async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Err::<(), _>(TestError(true))
            })
            .await;

        // 400 ms attempt, 1000 ms backoff, then the second attempt is cut off at the budget
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.attempts(), 2);
        assert!(err.elapsed() >= Duration::from_millis(500));
        match err {
            RetryError::TimedOut { last_error, .. } => assert!(last_error.is_some()),
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_error_from_earlier_attempt() {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(5),
            ..policy()
        };
        let attempts = Arc::new(AtomicU32::new(0));

        let result = policy
            .run("flaky_then_hung", || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(TestError(true));
                    }
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            })
            .await;

        match result {
            Err(RetryError::TimedOut {
                attempts,
                last_error: Some(TestError(true)),
                ..
            }) => assert_eq!(attempts, 2),
            other => panic!("expected TimedOut with the first error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_is_cut_off_at_budget() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(2_000),
            ..policy()
        };

        let result = policy
            .run("hung_op", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<(), TestError>(())
            })
            .await;

        match result {
            Err(RetryError::TimedOut {
                attempts,
                elapsed,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 1);
                assert_eq!(elapsed, Duration::from_millis(2_000));
                assert!(last_error.is_none());
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_that_ends_past_budget_keeps_last_error() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(1_000),
            ..policy()
        };

        let result = policy
            .run("slow_op", || async {
                tokio::time::sleep(Duration::from_millis(1_000)).await;
                Err::<(), _>(TestError(true))
            })
            .await;

        // The attempt races the budget; either way the result is a timeout
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.attempts(), 1);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = policy();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_millis(10_000));
    }

    #[test]
    fn test_default_configuration() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(10_000));
        assert_eq!(policy.timeout, Duration::from_millis(30_000));
    }
}
