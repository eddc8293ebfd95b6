//! Retry with exponential backoff
//!
//! Transient failures (timeouts, unavailable providers, provider-side
//! rate rejections) are retried up to a fixed attempt cap with doubling
//! delays. Non-transient errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use entigraph_core::Result;

/// Run `op` until it succeeds, a non-transient error occurs, or
/// `max_attempts` is exhausted. The closure receives the 1-based
/// attempt number.
pub async fn with_backoff<T, F, Fut>(max_attempts: u32, base_delay_ms: u64, op: F) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = Duration::from_millis(base_delay_ms << (attempt - 1));
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
