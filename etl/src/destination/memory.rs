use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::destination::{BulkOutcome, Destination, IndexDocument};
use crate::error::EtlResult;

#[derive(Debug, Default)]
struct IndexState {
    schema: Option<Value>,
    documents: BTreeMap<String, Value>,
    /// Number of document writes received, replays included.
    writes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    indices: HashMap<String, IndexState>,
}

/// Destination keeping every index in memory.
///
/// Writes to an index that was never created create it implicitly, like Elasticsearch does.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored documents of `index` keyed by id.
    pub async fn documents(&self, index: &str) -> BTreeMap<String, Value> {
        let inner = self.inner.lock().await;

        inner
            .indices
            .get(index)
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        let inner = self.inner.lock().await;

        inner
            .indices
            .get(index)
            .and_then(|state| state.documents.get(id).cloned())
    }

    /// Returns the number of document writes `index` received, replays included.
    pub async fn write_count(&self, index: &str) -> usize {
        let inner = self.inner.lock().await;

        inner.indices.get(index).map(|state| state.writes).unwrap_or(0)
    }

    pub async fn index_schema(&self, index: &str) -> Option<Value> {
        let inner = self.inner.lock().await;

        inner
            .indices
            .get(index)
            .and_then(|state| state.schema.clone())
    }

    pub async fn has_index(&self, index: &str) -> bool {
        let inner = self.inner.lock().await;

        inner.indices.contains_key(index)
    }

    /// Drops every index and document.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;

        inner.indices.clear();
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn create_index(&self, index: &str, schema: Option<Value>) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.indices.contains_key(index) {
            info!(index, "index already exists");
            return Ok(());
        }

        info!(index, "creating index");
        inner.indices.insert(
            index.to_owned(),
            IndexState {
                schema,
                ..IndexState::default()
            },
        );

        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexDocument>,
    ) -> EtlResult<BulkOutcome> {
        let mut inner = self.inner.lock().await;

        let state = inner.indices.entry(index.to_owned()).or_default();
        let written = documents.len();
        for document in documents {
            state.documents.insert(document.id, document.source);
        }
        state.writes += written;

        Ok(BulkOutcome {
            written,
            failures: Vec::new(),
        })
    }
}
