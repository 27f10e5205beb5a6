use std::future::Future;

use crate::error::EtlResult;

/// A JSON document addressed by its id within an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub source: serde_json::Value,
}

/// A document the index refused to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub id: String,
    pub reason: String,
}

/// Result of a bulk write: how many documents were stored and which ones were rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub written: usize,
    pub failures: Vec<DocumentFailure>,
}

impl BulkOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A search backend that stores JSON documents in named indices.
///
/// Writes must be idempotent upserts keyed by document id, since the sync loop replays every batch
/// whose watermark was not committed.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Releases resources held by the destination. The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = EtlResult<()>> + Send {
        async { Ok(()) }
    }

    /// Creates `index` with the given settings and mappings.
    ///
    /// An index that already exists is left untouched and reported as success.
    fn create_index(
        &self,
        index: &str,
        schema: Option<serde_json::Value>,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Inserts or replaces `documents` in `index`.
    ///
    /// Documents rejected individually are reported in [`BulkOutcome::failures`] rather than as an
    /// error; errors are reserved for requests that failed as a whole.
    fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexDocument>,
    ) -> impl Future<Output = EtlResult<BulkOutcome>> + Send;
}
