use serde::Deserialize;

use crate::Config;
use crate::shared::{
    DestinationConfig, IndexConfig, LogConfig, PgConnectionConfig, PipelineConfig,
    StateStoreConfig, ValidationError,
};

/// Complete configuration of the replicator process.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReplicatorConfig {
    pub source: PgConnectionConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub state_store: StateStoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl ReplicatorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.index.validate()?;
        self.state_store.validate()?;
        self.pipeline.validate()
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
