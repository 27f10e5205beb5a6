use movies_config::shared::{IndexConfig, PipelineConfig, RetryConfig};

use crate::destination::Destination;
use crate::pipeline::Pipeline;
use crate::source::Source;
use crate::store::WatermarkStore;

pub const TEST_MOVIES_INDEX: &str = "movies";

pub const TEST_PERSONS_INDEX: &str = "persons";

pub const TEST_GENRES_INDEX: &str = "genres";

/// Retry settings without delays, so that injected connection failures do not slow tests down.
pub fn test_retry_config() -> RetryConfig {
    RetryConfig {
        initial_delay_ms: 0,
        backoff_multiplier: 1.0,
        max_delay_ms: 0,
        max_attempts: Some(5),
    }
}

/// Builder for pipelines wired with test defaults.
///
/// Defaults to a scan limit of 100, a single iteration per [`Pipeline::run`], no poll interval,
/// delay-free retries and only the movies index.
pub struct PipelineBuilder<Src, S, D> {
    source: Src,
    store: S,
    destination: D,
    config: PipelineConfig,
    indices: IndexConfig,
}

impl<Src, S, D> PipelineBuilder<Src, S, D>
where
    Src: Source + Clone + Send + Sync,
    S: WatermarkStore + Send + Sync,
    D: Destination + Send + Sync,
{
    pub fn new(source: Src, store: S, destination: D) -> Self {
        Self {
            source,
            store,
            destination,
            config: PipelineConfig {
                scan_limit: PipelineConfig::DEFAULT_SCAN_LIMIT,
                poll_interval_ms: 0,
                max_iterations: Some(1),
                retry: test_retry_config(),
            },
            indices: IndexConfig {
                movies_index: TEST_MOVIES_INDEX.to_owned(),
                ..IndexConfig::default()
            },
        }
    }

    pub fn with_scan_limit(mut self, scan_limit: u32) -> Self {
        self.config.scan_limit = scan_limit;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u64>) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.config.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Also indexes persons and genres into their own indices.
    pub fn with_dimension_indices(mut self) -> Self {
        self.indices.persons_index = Some(TEST_PERSONS_INDEX.to_owned());
        self.indices.genres_index = Some(TEST_GENRES_INDEX.to_owned());
        self
    }

    pub fn build(self) -> Pipeline<Src, S, D> {
        Pipeline::new(
            self.config,
            self.indices,
            self.source,
            self.store,
            self.destination,
        )
    }
}
