use serde::Deserialize;
use std::path::PathBuf;

use crate::shared::ValidationError;

/// Where watermarks are persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StateStoreConfig {
    /// Watermarks live in memory and are lost on restart, which forces a full resync.
    Memory,
    /// Watermarks are persisted as a flat JSON object in a single file.
    File { path: PathBuf },
}

impl StateStoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let StateStoreConfig::File { path } = self
            && path.as_os_str().is_empty()
        {
            return Err(ValidationError::EmptyField("state_store.path".to_string()));
        }

        Ok(())
    }
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("state.json"),
        }
    }
}
