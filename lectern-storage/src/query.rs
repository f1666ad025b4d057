//! Retrying query façade used by every repository.

use std::fmt;
use std::future::Future;

use lectern_core::RetryPolicy;

use crate::context::{ContextError, QueryContext};
use crate::retry::{is_transient, retry_with_backoff, Classifier, DriverError};

/// Entry point for store access with the process-wide retry policy.
///
/// Repositories hold one of these and route every store call through
/// [`exec_query`](Self::exec_query) or [`exec_command`](Self::exec_command).
/// The policy is injected at construction; there is no global state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryExecutor {
    policy: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a value-returning operation, retrying transient failures.
    pub async fn exec_query<T, E, F, Fut>(&self, ctx: &QueryContext, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: DriverError + From<ContextError> + fmt::Display,
    {
        retry_with_backoff(ctx, &self.policy, Some(is_transient as Classifier<E>), operation).await
    }

    /// Run a side-effect-only operation, retrying transient failures.
    ///
    /// Whatever the operation yields on success (e.g. a row count) is
    /// discarded. Only route idempotent writes through here.
    pub async fn exec_command<R, E, F, Fut>(&self, ctx: &QueryContext, mut operation: F) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: DriverError + From<ContextError> + fmt::Display,
    {
        self.exec_query(ctx, || {
            let fut = operation();
            async move { fut.await.map(drop) }
        })
        .await
    }
}
