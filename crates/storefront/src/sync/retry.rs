//! Bounded exponential backoff for store calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::store::StoreResult;

/// Retry schedule for store writes.
///
/// Attempt `n` (1-based) waits `initial_backoff * 2^(n-1)`, capped at
/// `max_backoff`, plus up to a quarter of that again as jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy with a single attempt and no waiting.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retrying after failed attempt `attempt`, without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }

    /// `base` plus up to a quarter of it.
    #[must_use]
    pub fn jittered(base: Duration) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        if base_ms == 0 {
            return base;
        }
        let max_extra = (base_ms / 4).max(1);
        let extra = rand::rng().random_range(0..=max_extra);
        Duration::from_millis(base_ms.saturating_add(extra))
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts.
    ///
    /// # Errors
    ///
    /// Returns the last error from `call`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = Self::jittered(self.base_delay(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(operation, attempt, error = %error, "store call failed");
                    return Err(error);
                }
            }
        }
    }
}
