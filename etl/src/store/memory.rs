use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::store::base::WatermarkStore;
use crate::types::Watermark;

#[derive(Debug, Default)]
struct Inner {
    watermarks: BTreeMap<String, Watermark>,
    /// Every value written per key, oldest first.
    history: HashMap<String, Vec<Watermark>>,
}

/// Watermark store kept in memory and lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatermarkStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every value written under `key`, oldest first.
    pub async fn history(&self, key: &str) -> Vec<Watermark> {
        let inner = self.inner.lock().await;

        inner.history.get(key).cloned().unwrap_or_default()
    }

    /// Forgets every watermark, as if the checkpoint file had been deleted.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;

        inner.watermarks.clear();
        inner.history.clear();
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, key: &str) -> EtlResult<Option<Watermark>> {
        let inner = self.inner.lock().await;

        Ok(inner.watermarks.get(key).copied())
    }

    async fn set(&self, key: &str, watermark: Watermark) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        inner.watermarks.insert(key.to_owned(), watermark);
        inner
            .history
            .entry(key.to_owned())
            .or_default()
            .push(watermark);

        Ok(())
    }

    async fn snapshot(&self) -> EtlResult<BTreeMap<String, Watermark>> {
        let inner = self.inner.lock().await;

        Ok(inner.watermarks.clone())
    }
}
