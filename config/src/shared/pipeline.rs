use serde::Deserialize;
use std::time::Duration;

use crate::shared::{RetryConfig, ValidationError};

/// Settings of the sync loop itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Maximum number of rows returned by a single change scan or cascade query.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: u32,
    /// Pause between two full iterations. The loop restarts immediately when zero.
    #[serde(default)]
    pub poll_interval_ms: u64,
    /// Stops the loop after this many iterations. Runs forever when unset.
    #[serde(default)]
    pub max_iterations: Option<u64>,
    /// Backoff applied to source queries and index writes.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub const DEFAULT_SCAN_LIMIT: u32 = 100;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.scan_limit == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.scan_limit".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        self.retry.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
            poll_interval_ms: 0,
            max_iterations: None,
            retry: RetryConfig::default(),
        }
    }
}

fn default_scan_limit() -> u32 {
    PipelineConfig::DEFAULT_SCAN_LIMIT
}
