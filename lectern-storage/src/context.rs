//! Cancellable execution context for store operations.
//!
//! A [`QueryContext`] bundles a [`CancellationToken`] with an optional
//! deadline. The retry loop checks it before every attempt and races every
//! backoff sleep against it, so a cancelled request never starts new work and
//! never waits out a full delay.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context is no longer usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Execution context passed to every façade call.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token (e.g. one owned by a request).
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now. An earlier existing deadline wins.
    ///
    /// A timeout too large to represent as an instant leaves the deadline
    /// unchanged.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Set an absolute deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context that is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail if the context has been cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration`, waking early with an error on cancellation or
    /// when the deadline passes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        self.check()?;

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ContextError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(ContextError::DeadlineExceeded),
                    _ = tokio::time::sleep(duration) => Ok(()),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ContextError::Cancelled),
                    _ = tokio::time::sleep(duration) => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_context_is_live() {
        let ctx = QueryContext::new();
        assert_eq!(ctx.check(), Ok(()));
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_observed_by_check() {
        let ctx = QueryContext::new();
        ctx.cancel();
        assert_eq!(ctx.check(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_propagates_to_child() {
        let parent = QueryContext::new();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.check(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_cancel_does_not_affect_parent() {
        let parent = QueryContext::new();
        let child = parent.child();
        child.cancel();
        assert_eq!(parent.check(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let ctx = QueryContext::new()
            .with_timeout(Duration::from_millis(100))
            .with_timeout(Duration::from_secs(10));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_keeps_existing_deadline() {
        let ctx = QueryContext::new().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.check(), Ok(()));

        let bounded = QueryContext::new().with_timeout(Duration::from_secs(1));
        let before = bounded.deadline();
        let ctx = bounded.with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_token_cancels_context() {
        let request = CancellationToken::new();
        let ctx = QueryContext::with_token(request.clone());
        assert_eq!(ctx.check(), Ok(()));

        request.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.check(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_when_live() {
        let ctx = QueryContext::new();
        let start = Instant::now();
        ctx.sleep(Duration::from_millis(250)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_cancel() {
        let ctx = QueryContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(5)).await;
        assert_eq!(result, Err(ContextError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_cut_short_by_deadline() {
        let ctx = QueryContext::new().with_timeout(Duration::from_millis(30));
        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(1)).await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_on_dead_context_returns_immediately() {
        let ctx = QueryContext::new();
        ctx.cancel();
        let start = Instant::now();
        assert_eq!(
            ctx.sleep(Duration::from_secs(1)).await,
            Err(ContextError::Cancelled)
        );
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
