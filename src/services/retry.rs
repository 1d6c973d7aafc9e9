//! Bounded retry of whole transactions on lock contention

use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// Run `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is exhausted. Each try must open its own unit of work.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    backoff: Duration,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut tried = 0;
    loop {
        tried += 1;
        match attempt().await {
            Err(e) if e.is_retryable() && tried < max_attempts => {
                tracing::warn!(
                    "{} hit contention (attempt {}/{}): {}",
                    operation,
                    tried,
                    max_attempts,
                    e
                );
                tokio::time::sleep(backoff * tried).await;
            }
            other => return other,
        }
    }
}
