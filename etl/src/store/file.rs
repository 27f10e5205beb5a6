use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::EtlResult;
use crate::store::base::WatermarkStore;
use crate::types::Watermark;

/// Watermark store persisted as a flat JSON object of string values in a single file.
///
/// The file is read on every access, so changes made by an operator between runs are picked up.
/// Reads fail open: a missing, unreadable or malformed file makes every key absent, and an
/// unparseable value makes its key absent. Writes replace the whole file atomically by writing a
/// sibling temporary file, syncing it and renaming it over the target.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temporary_path(&self) -> PathBuf {
        let mut path = OsString::from(self.path.as_os_str());
        path.push(".tmp");

        PathBuf::from(path)
    }

    /// Reads the raw string values of the file.
    async fn read_values(&self) -> BTreeMap<String, String> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "watermark file does not exist yet");
                return BTreeMap::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read watermark file, treating every watermark as absent");
                return BTreeMap::new();
            }
        };

        let object = match serde_json::from_slice::<Map<String, Value>>(&contents) {
            Ok(object) => object,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "watermark file is not a JSON object, treating every watermark as absent");
                return BTreeMap::new();
            }
        };

        object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(value) => Some((key, value)),
                other => {
                    warn!(key = %key, value = %other, "ignoring non-string watermark value");
                    None
                }
            })
            .collect()
    }

    async fn write_values(&self, values: &BTreeMap<String, String>) -> EtlResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_vec_pretty(values)?;
        let temporary_path = self.temporary_path();

        let mut file = tokio::fs::File::create(&temporary_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temporary_path, &self.path).await?;

        Ok(())
    }
}

fn parse_value(key: &str, value: &str) -> Option<Watermark> {
    match value.parse::<Watermark>() {
        Ok(watermark) => Some(watermark),
        Err(err) => {
            warn!(key, value, error = %err, "ignoring unparseable watermark");
            None
        }
    }
}

impl WatermarkStore for FileWatermarkStore {
    async fn get(&self, key: &str) -> EtlResult<Option<Watermark>> {
        let values = self.read_values().await;

        Ok(values.get(key).and_then(|value| parse_value(key, value)))
    }

    async fn set(&self, key: &str, watermark: Watermark) -> EtlResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut values = self.read_values().await;
        values.insert(key.to_owned(), watermark.to_string());
        self.write_values(&values).await?;

        debug!(key, %watermark, "watermark stored");

        Ok(())
    }

    async fn snapshot(&self) -> EtlResult<BTreeMap<String, Watermark>> {
        let values = self.read_values().await;

        Ok(values
            .iter()
            .filter_map(|(key, value)| parse_value(key, value).map(|w| (key.clone(), w)))
            .collect())
    }
}
