use serde::Deserialize;
use std::path::PathBuf;

/// Where the process writes its logs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    /// Log file path. Logs go to stdout when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}
