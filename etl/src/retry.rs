//! Exponential backoff around fallible calls to the source database and the search index.

use std::future::Future;
use std::time::Duration;

use movies_config::shared::RetryConfig;
use rand::Rng;
use tracing::{error, warn};

use crate::error::EtlResult;

/// Upper bound of the random jitter, as a fraction of the computed delay.
const MAX_JITTER_FACTOR: f64 = 0.3;

/// Retries an operation while it fails with a connection-class error.
///
/// The delay before retry `n` (1-indexed) is `initial_delay * multiplier^(n - 1)`, capped at
/// `max_delay`, plus up to 30% of random jitter, still capped at `max_delay`. Without
/// `max_attempts` the operation is retried until it succeeds or fails with another kind of error.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            initial_delay,
            multiplier,
            max_delay,
            max_attempts,
        }
    }

    /// A policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO, Some(1))
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Computes the delay to wait before retry number `retry` (1-indexed).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_delay_ms = self.max_delay.as_millis() as f64;
        let capped_delay_ms = base_delay_ms.min(max_delay_ms);

        let jitter_factor = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FACTOR);
        let jittered_delay_ms = (capped_delay_ms * (1.0 + jitter_factor)).min(max_delay_ms);

        Duration::from_millis(jittered_delay_ms as u64)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error or exhausts the
    /// configured attempts.
    pub async fn run<F, Fut, T>(&self, operation: &'static str, mut f: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut attempt: u32 = 1;

        loop {
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.kind().is_connection_retryable() {
                return Err(err);
            }

            if let Some(max_attempts) = self.max_attempts {
                if attempt >= max_attempts {
                    error!(operation, attempt, error = %err, "retry attempts exhausted");
                    return Err(err);
                }
            }

            let delay = self.backoff(attempt);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "connection failed, retrying"
            );

            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.initial_delay(),
            config.backoff_multiplier,
            config.max_delay(),
            config.max_attempts,
        )
    }
}
