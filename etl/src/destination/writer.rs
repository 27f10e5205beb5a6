use std::collections::BTreeMap;

use movies_config::shared::IndexConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::destination::{BulkOutcome, Destination, IndexDocument};
use crate::error::{ErrorKind, EtlResult};
use crate::retry::RetryPolicy;
use crate::types::EntityId;
use crate::{bail, etl_error};

/// Failed ids listed in a partial write error before the rest is elided.
const MAX_REPORTED_FAILURES: usize = 10;

/// Writes typed documents into named indices of a [`Destination`].
///
/// Documents are keyed by the string form of their [`EntityId`], so replaying a batch overwrites
/// the same documents. A bulk write in which any document was rejected fails with
/// [`ErrorKind::DestinationPartialWrite`].
#[derive(Debug, Clone)]
pub struct IndexWriter<D> {
    destination: D,
    retry: RetryPolicy,
}

impl<D> IndexWriter<D>
where
    D: Destination + Sync,
{
    pub fn new(destination: D, retry: RetryPolicy) -> Self {
        Self { destination, retry }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Upserts every document of `documents` into `index`.
    pub async fn upsert<T>(
        &self,
        index: &str,
        documents: &BTreeMap<EntityId, T>,
    ) -> EtlResult<BulkOutcome>
    where
        T: Serialize,
    {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let documents = documents
            .iter()
            .map(|(id, document)| {
                let source = serde_json::to_value(document).map_err(|err| {
                    etl_error!(
                        ErrorKind::SerializationError,
                        "Document serialization failed",
                        format!("document {id}: {err}")
                    )
                })?;

                Ok(IndexDocument {
                    id: id.to_string(),
                    source,
                })
            })
            .collect::<EtlResult<Vec<_>>>()?;

        let outcome = self
            .retry
            .run("bulk upsert", || {
                self.destination.bulk_upsert(index, documents.clone())
            })
            .await?;

        if !outcome.is_complete() {
            warn!(
                index,
                written = outcome.written,
                failed = outcome.failures.len(),
                "index rejected some documents"
            );

            let mut detail = outcome
                .failures
                .iter()
                .take(MAX_REPORTED_FAILURES)
                .map(|failure| format!("{} ({})", failure.id, failure.reason))
                .collect::<Vec<_>>()
                .join(", ");
            if outcome.failures.len() > MAX_REPORTED_FAILURES {
                detail.push_str(&format!(
                    " and {} more",
                    outcome.failures.len() - MAX_REPORTED_FAILURES
                ));
            }

            bail!(
                ErrorKind::DestinationPartialWrite,
                "Some documents were rejected by the index",
                format!("index `{index}`: {detail}")
            );
        }

        debug!(index, written = outcome.written, "documents upserted");

        Ok(outcome)
    }

    /// Creates every configured index, using `<schema_dir>/<index>.json` as its body when the file
    /// exists.
    pub async fn bootstrap(&self, config: &IndexConfig) -> EtlResult<()> {
        for index in config.index_names() {
            let schema = match config.schema_path(index) {
                Some(path) => read_schema(&path).await?,
                None => None,
            };

            info!(index, with_schema = schema.is_some(), "bootstrapping index");

            self.retry
                .run("create index", || {
                    self.destination.create_index(index, schema.clone())
                })
                .await?;
        }

        Ok(())
    }
}

async fn read_schema(path: &std::path::Path) -> EtlResult<Option<Value>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no schema file for index");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let schema = serde_json::from_str(&contents).map_err(|err| {
        etl_error!(
            ErrorKind::ConfigError,
            "Index schema file is not valid JSON",
            format!("{}: {err}", path.display())
        )
    })?;

    Ok(Some(schema))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::destination::memory::MemoryDestination;

    #[derive(Serialize)]
    struct Doc {
        title: &'static str,
    }

    #[tokio::test]
    async fn upsert_keys_documents_by_id() {
        let destination = MemoryDestination::new();
        let writer = IndexWriter::new(destination.clone(), RetryPolicy::no_retry());
        let id = Uuid::new_v4();

        let outcome = writer
            .upsert("movies", &BTreeMap::from([(id, Doc { title: "Alien" })]))
            .await
            .unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(
            destination.document("movies", &id.to_string()).await,
            Some(json!({ "title": "Alien" }))
        );
    }

    #[tokio::test]
    async fn empty_batch_does_not_touch_the_index() {
        let destination = MemoryDestination::new();
        let writer = IndexWriter::new(destination.clone(), RetryPolicy::no_retry());

        let outcome = writer
            .upsert::<Doc>("movies", &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(outcome, BulkOutcome::default());
        assert!(!destination.has_index("movies").await);
    }

    #[tokio::test]
    async fn bootstrap_reads_schema_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("movies.json"),
            r#"{"mappings": {"properties": {"title": {"type": "text"}}}}"#,
        )
        .await
        .unwrap();
        let destination = MemoryDestination::new();
        let writer = IndexWriter::new(destination.clone(), RetryPolicy::no_retry());
        let config = IndexConfig {
            persons_index: Some("persons".to_owned()),
            schema_dir: Some(dir.path().to_path_buf()),
            ..IndexConfig::default()
        };

        writer.bootstrap(&config).await.unwrap();

        assert!(destination.index_schema("movies").await.is_some());
        assert!(destination.has_index("persons").await);
        assert_eq!(destination.index_schema("persons").await, None);
    }

    #[tokio::test]
    async fn invalid_schema_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("movies.json"), "{ nope")
            .await
            .unwrap();
        let writer = IndexWriter::new(MemoryDestination::new(), RetryPolicy::no_retry());
        let config = IndexConfig {
            schema_dir: Some(dir.path().to_path_buf()),
            ..IndexConfig::default()
        };

        let err = writer.bootstrap(&config).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
