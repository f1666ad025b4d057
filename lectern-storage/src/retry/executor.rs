//! Generic retry loop with exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use lectern_core::RetryPolicy;

use crate::context::{ContextError, QueryContext};

/// Predicate deciding whether an error is worth another attempt.
pub type Classifier<E> = fn(&E) -> bool;

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts, or the context dies.
///
/// - The operation is invoked at most `policy.max_attempts()` times.
/// - The context is checked before every attempt, including the first; a dead
///   context returns its error without invoking the operation.
/// - After attempt `k` fails with an error `classifier` accepts, the loop
///   sleeps `policy.delay_after(k)` (`base_delay * 2^k`) before attempt
///   `k + 1`. The sleep is raced against the context.
/// - With `classifier == None` nothing is retried.
/// - The error of the last attempt is returned unchanged.
///
/// A retried operation runs again from scratch: it must be read-only or
/// idempotent.
pub async fn retry_with_backoff<T, E, F, Fut>(
    ctx: &QueryContext,
    policy: &RetryPolicy,
    classifier: Option<Classifier<E>>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ContextError> + fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        ctx.check()?;
        attempt += 1;

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "store operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let retryable = classifier.is_some_and(|is_retryable| is_retryable(&err));
        if !retryable {
            tracing::debug!(attempt, error = %err, "store operation failed with non-retryable error");
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::error!(
                attempt,
                max_attempts,
                error = %err,
                "store operation failed, retries exhausted"
            );
            return Err(err);
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = millis(delay),
            error = %err,
            "transient store error, retrying"
        );

        ctx.sleep(delay).await?;
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::classifier::{is_transient, DriverError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use thiserror::Error;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    enum TestError {
        #[error("transient: {0}")]
        Transient(&'static str),
        #[error("row not found")]
        NotFound,
        #[error("context: {0}")]
        Context(#[from] ContextError),
    }

    impl DriverError for TestError {
        fn sql_state(&self) -> Option<&str> {
            match self {
                TestError::Transient(code) => Some(*code),
                _ => None,
            }
        }

        fn is_not_found(&self) -> bool {
            matches!(self, TestError::NotFound)
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(100)).unwrap()
    }

    /// Operation that fails with the scripted errors in order, then succeeds.
    fn scripted(
        failures: Vec<TestError>,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, TestError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            std::future::ready(match failures.get(n) {
                Some(err) => Err(err.clone()),
                None => Ok(n as u32 + 1),
            })
        }
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(400)), 400);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(vec![], calls.clone()),
        )
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_uses_every_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let failures = vec![TestError::Transient("08006"); 10];

        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(4),
            Some(is_transient::<TestError>),
            scripted(failures, calls.clone()),
        )
        .await;

        assert_eq!(result, Err(TestError::Transient("08006")));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success_runs_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(vec![TestError::Transient("40001")], calls.clone()),
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(vec![TestError::NotFound; 5], calls.clone()),
        )
        .await;

        assert_eq!(result, Err(TestError::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_classifier_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(5),
            None,
            scripted(vec![TestError::Transient("08006")], calls.clone()),
        )
        .await;

        assert_eq!(result, Err(TestError::Transient("08006")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_context_never_invokes_operation() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = QueryContext::new();
        ctx.cancel();

        let result = retry_with_backoff(
            &ctx,
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(vec![], calls.clone()),
        )
        .await;

        assert_eq!(result, Err(TestError::Context(ContextError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let failures = vec![TestError::Transient("08006"); 3];

        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(failures, calls.clone()),
        )
        .await;

        // 200ms + 400ms + 800ms before attempts 2, 3 and 4
        assert_eq!(result, Ok(4));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1400), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_final_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = retry_with_backoff(
            &QueryContext::new(),
            &policy(2),
            Some(is_transient::<TestError>),
            scripted(vec![TestError::Transient("53300"); 2], calls.clone()),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(400), "slept after last attempt: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = QueryContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = retry_with_backoff(
            &ctx,
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(vec![TestError::Transient("08006"); 5], calls.clone()),
        )
        .await;

        assert_eq!(result, Err(TestError::Context(ContextError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = QueryContext::new().with_timeout(Duration::from_millis(300));

        let result = retry_with_backoff(
            &ctx,
            &policy(5),
            Some(is_transient::<TestError>),
            scripted(vec![TestError::Transient("57P01"); 5], calls.clone()),
        )
        .await;

        // attempt 1 at 0ms, attempt 2 at 200ms, deadline hits during the 400ms sleep
        assert_eq!(result, Err(TestError::Context(ContextError::DeadlineExceeded)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_operation_borrows_state() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<&str, TestError> = retry_with_backoff(
            &QueryContext::new(),
            &policy(3),
            Some(is_transient::<TestError>),
            move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TestError::Transient("40P01"))
                } else {
                    Ok("done")
                }
            },
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
