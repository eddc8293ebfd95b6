//! Outbound call rate limiting
//!
//! A single token-bucket limiter shared by all workers bounds calls to
//! the external model and embedding provider. Callers block on an empty
//! bucket up to a configured wait; past that the call is deferred to the
//! next sub-batch rather than failed outright.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use entigraph_core::{EngineError, Result};

/// Shared token-bucket limiter for outbound provider calls
pub struct CallLimiter {
    inner: DefaultDirectRateLimiter,
    max_wait: Duration,
}

impl CallLimiter {
    pub fn new(requests_per_minute: u32, max_wait: Duration) -> Result<Self> {
        let quota = NonZeroU32::new(requests_per_minute)
            .ok_or_else(|| EngineError::ConfigError("requests_per_minute must be > 0".into()))?;

        Ok(Self {
            inner: RateLimiter::direct(Quota::per_minute(quota)),
            max_wait,
        })
    }

    /// Take one permit, waiting for the bucket to refill if necessary.
    ///
    /// Returns [`EngineError::RateLimitExceeded`] once the bounded wait
    /// elapses; the orchestrator treats that as "defer", never as a
    /// caller-visible failure.
    pub async fn acquire(&self) -> Result<()> {
        tokio::time::timeout(self.max_wait, self.inner.until_ready())
            .await
            .map_err(|_| EngineError::RateLimitExceeded)
    }

    /// Non-blocking permit check, used by tests and opportunistic work
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_within_quota() {
        let limiter = CallLimiter::new(600, Duration::from_millis(100)).unwrap();
        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exhausted_bucket_defers() {
        // One request per minute: the second acquire cannot succeed
        // within the bounded wait.
        let limiter = CallLimiter::new(1, Duration::from_millis(20)).unwrap();
        limiter.acquire().await.unwrap();

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimitExceeded));
    }

    #[test]
    fn test_zero_rate_is_config_error() {
        assert!(CallLimiter::new(0, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_try_acquire_reflects_bucket() {
        let limiter = CallLimiter::new(1, Duration::from_millis(10)).unwrap();
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
