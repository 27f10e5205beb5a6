use serde::Deserialize;
use std::time::Duration;

use crate::shared::ValidationError;

/// Backoff settings used when the source or the search index is unreachable.
///
/// The delay before attempt `n` (0-based) is `initial_delay_ms * backoff_multiplier^n`, capped at
/// `max_delay_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Number of attempts before giving up. Retries forever when unset.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl RetryConfig {
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

    pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.backoff_multiplier".to_string(),
                constraint: "must be at least 1.0".to_string(),
            });
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.max_delay_ms".to_string(),
                constraint: "must not be lower than `initial_delay_ms`".to_string(),
            });
        }
        if self.max_attempts == Some(0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.max_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: None,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    RetryConfig::DEFAULT_BACKOFF_MULTIPLIER
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}
