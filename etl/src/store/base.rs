use std::collections::BTreeMap;
use std::future::Future;

use crate::error::EtlResult;
use crate::types::Watermark;

/// Key/value registry of watermarks.
///
/// Keys are the entity watermark keys plus the cascade key. A single sync loop writes to the store,
/// so implementations only need every `set` to be atomic on its own.
pub trait WatermarkStore {
    /// Returns the watermark stored under `key`, or `None` when it is absent or unreadable.
    fn get(&self, key: &str) -> impl Future<Output = EtlResult<Option<Watermark>>> + Send;

    /// Stores `watermark` under `key`, replacing the previous value.
    fn set(&self, key: &str, watermark: Watermark) -> impl Future<Output = EtlResult<()>> + Send;

    /// Returns every readable watermark, for diagnostics.
    fn snapshot(&self) -> impl Future<Output = EtlResult<BTreeMap<String, Watermark>>> + Send;
}
