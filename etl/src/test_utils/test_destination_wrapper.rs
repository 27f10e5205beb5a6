use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::concurrency::shutdown::ShutdownTx;
use crate::destination::{BulkOutcome, Destination, DocumentFailure, IndexDocument};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// A bulk write received by the wrapper, failed ones included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCall {
    pub index: String,
    pub ids: Vec<String>,
}

#[derive(Debug)]
struct Inner<D> {
    wrapped_destination: D,
    bulk_calls: Vec<BulkCall>,
    created_indices: Vec<String>,
    /// Ids rejected the next time they are written.
    failing_ids: HashSet<String>,
    pending_connection_failures: u32,
    /// Fired once the next bulk write has been applied.
    shutdown_after_write: Option<ShutdownTx>,
    shutdown_called: bool,
}

/// Test wrapper for [`Destination`] implementations that records writes and injects failures.
///
/// Injected document failures are one-shot: the document is rejected once, reported in the
/// [`BulkOutcome`] like a mapping error would be, and accepted on the next attempt.
#[derive(Debug, Clone)]
pub struct TestDestinationWrapper<D> {
    inner: Arc<RwLock<Inner<D>>>,
}

impl<D> TestDestinationWrapper<D> {
    pub fn wrap(destination: D) -> Self {
        let inner = Inner {
            wrapped_destination: destination,
            bulk_calls: Vec::new(),
            created_indices: Vec::new(),
            failing_ids: HashSet::new(),
            pending_connection_failures: 0,
            shutdown_after_write: None,
            shutdown_called: false,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Rejects the document with `id` the next time it is written.
    pub async fn fail_document_once(&self, id: impl ToString) {
        self.inner.write().await.failing_ids.insert(id.to_string());
    }

    /// Fails the next `count` requests with [`ErrorKind::DestinationConnectionFailed`].
    pub async fn fail_next_requests(&self, count: u32) {
        self.inner.write().await.pending_connection_failures = count;
    }

    /// Requests shutdown through `shutdown_tx` right after the next bulk write is applied, before
    /// its outcome reaches the caller.
    pub async fn shutdown_after_next_write(&self, shutdown_tx: ShutdownTx) {
        self.inner.write().await.shutdown_after_write = Some(shutdown_tx);
    }

    pub async fn bulk_calls(&self) -> Vec<BulkCall> {
        self.inner.read().await.bulk_calls.clone()
    }

    pub async fn bulk_calls_for(&self, index: &str) -> Vec<BulkCall> {
        self.inner
            .read()
            .await
            .bulk_calls
            .iter()
            .filter(|call| call.index == index)
            .cloned()
            .collect()
    }

    pub async fn created_indices(&self) -> Vec<String> {
        self.inner.read().await.created_indices.clone()
    }

    /// Returns whether the shutdown method was called on the destination.
    pub async fn shutdown_called(&self) -> bool {
        self.inner.read().await.shutdown_called
    }
}

impl<D> TestDestinationWrapper<D>
where
    D: Clone,
{
    /// Returns a handle to the wrapped destination.
    pub async fn wrapped(&self) -> D {
        self.inner.read().await.wrapped_destination.clone()
    }

    /// Consumes a pending connection failure, if any, and returns the wrapped destination.
    async fn begin_request(&self) -> EtlResult<D> {
        let mut inner = self.inner.write().await;
        if inner.pending_connection_failures > 0 {
            inner.pending_connection_failures -= 1;
            return Err(etl_error!(
                ErrorKind::DestinationConnectionFailed,
                "Injected connection failure"
            ));
        }

        Ok(inner.wrapped_destination.clone())
    }
}

impl<D> Destination for TestDestinationWrapper<D>
where
    D: Destination + Send + Sync + Clone,
{
    fn name() -> &'static str {
        "wrapper"
    }

    async fn shutdown(&self) -> EtlResult<()> {
        let destination = self.wrapped().await;

        let result = destination.shutdown().await;
        self.inner.write().await.shutdown_called = true;

        result
    }

    async fn create_index(&self, index: &str, schema: Option<Value>) -> EtlResult<()> {
        let destination = self.begin_request().await?;

        let result = destination.create_index(index, schema).await;
        if result.is_ok() {
            self.inner
                .write()
                .await
                .created_indices
                .push(index.to_owned());
        }

        result
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexDocument>,
    ) -> EtlResult<BulkOutcome> {
        let ids: Vec<String> = documents.iter().map(|document| document.id.clone()).collect();
        {
            let mut inner = self.inner.write().await;
            inner.bulk_calls.push(BulkCall {
                index: index.to_owned(),
                ids,
            });
        }

        let destination = self.begin_request().await?;

        let mut failures = Vec::new();
        let accepted = {
            let mut inner = self.inner.write().await;
            documents
                .into_iter()
                .filter(|document| {
                    if inner.failing_ids.remove(&document.id) {
                        failures.push(DocumentFailure {
                            id: document.id.clone(),
                            reason: "injected failure".to_owned(),
                        });
                        return false;
                    }

                    true
                })
                .collect::<Vec<_>>()
        };

        let mut outcome = destination.bulk_upsert(index, accepted).await?;
        outcome.failures.extend(failures);

        if let Some(shutdown_tx) = self.inner.write().await.shutdown_after_write.take() {
            shutdown_tx.shutdown();
        }

        Ok(outcome)
    }
}
