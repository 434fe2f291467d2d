//! Retry wrapper for read-modify-write transactions.

use crate::error::ConferenceError;
use conference_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::future::Future;

/// Run `attempt` until it succeeds, fails deterministically, or the policy
/// runs out of retries.
///
/// Each call to `attempt` must open its own transaction. A store conflict
/// that survives every retry becomes `TransientStoreContention`.
pub(crate) async fn with_retries<F, Fut, T>(
    policy: &RetryPolicy,
    attempt: F,
) -> Result<T, ConferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConferenceError>>,
{
    retry_with_predicate(policy.clone(), attempt, ConferenceError::is_retryable)
        .await
        .map_err(|err| {
            if err.is_retryable() {
                tracing::warn!(error = %err, attempts = policy.max_attempts(), "Giving up on contended transaction");
                ConferenceError::TransientStoreContention {
                    attempts: policy.max_attempts(),
                }
            } else {
                err
            }
        })
}
