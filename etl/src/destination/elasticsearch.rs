use std::collections::BTreeMap;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::destination::{BulkOutcome, Destination, DocumentFailure, IndexDocument};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::{bail, etl_error};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Error type reported when creating an index that is already there.
const INDEX_EXISTS_ERROR_TYPE: &str = "resource_already_exists_exception";

/// Destination writing to an Elasticsearch-compatible search engine over its REST API.
///
/// Documents are written with the `_bulk` endpoint using `index` actions, which insert or fully
/// replace the document with the given `_id`.
#[derive(Debug, Clone)]
pub struct ElasticsearchDestination {
    client: reqwest::Client,
    base_url: String,
}

impl ElasticsearchDestination {
    /// Creates a destination for the cluster at `url`, e.g. `http://127.0.0.1:9200`.
    pub fn new(url: impl Into<String>) -> EtlResult<Self> {
        let client = reqwest::Client::builder().build().map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Failed to build the search index HTTP client",
                err
            )
        })?;

        let base_url = url.into().trim_end_matches('/').to_owned();

        Ok(Self { client, base_url })
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{index}", self.base_url)
    }

    fn bulk_url(&self) -> String {
        format!("{}/_bulk", self.base_url)
    }
}

impl Destination for ElasticsearchDestination {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn create_index(&self, index: &str, schema: Option<Value>) -> EtlResult<()> {
        let body = schema.unwrap_or_else(|| json!({}));

        let response = self
            .client
            .put(self.index_url(index))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(index, "index created");
            return Ok(());
        }

        let body = response.text().await?;
        if is_index_exists_error(&body) {
            info!(index, "index already exists");
            return Ok(());
        }

        Err(status_error(status, "Index creation failed", &body))
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexDocument>,
    ) -> EtlResult<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = encode_bulk_body(index, &documents)?;
        debug!(index, documents = documents.len(), "sending bulk request");

        let response = self
            .client
            .post(self.bulk_url())
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(status_error(
                status,
                "Bulk request failed",
                &String::from_utf8_lossy(&body),
            ));
        }

        parse_bulk_response(&body, &documents)
    }
}

/// Encodes `documents` as an NDJSON `_bulk` body of `index` actions.
fn encode_bulk_body(index: &str, documents: &[IndexDocument]) -> EtlResult<String> {
    let mut body = String::new();

    for document in documents {
        let action = json!({ "index": { "_index": index, "_id": document.id } });
        body.push_str(&serde_json::to_string(&action).map_err(serialization_error)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&document.source).map_err(serialization_error)?);
        body.push('\n');
    }

    Ok(body)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Extracts per-document results from a `_bulk` response.
///
/// Items are reported in request order, one per action.
fn parse_bulk_response(body: &[u8], documents: &[IndexDocument]) -> EtlResult<BulkOutcome> {
    let response: BulkResponse = serde_json::from_slice(body)?;

    if response.items.len() != documents.len() {
        bail!(
            ErrorKind::InvalidData,
            "Bulk response does not match the request",
            format!(
                "expected {} items, got {}",
                documents.len(),
                response.items.len()
            )
        );
    }

    let mut outcome = BulkOutcome::default();
    for (item, document) in response.items.into_iter().zip(documents) {
        let Some(result) = item.into_values().next() else {
            bail!(ErrorKind::InvalidData, "Bulk response item has no action");
        };

        if result.error.is_none() && result.status < 300 {
            outcome.written += 1;
            continue;
        }

        outcome.failures.push(DocumentFailure {
            id: result.id.unwrap_or_else(|| document.id.clone()),
            reason: failure_reason(result.status, result.error.as_ref()),
        });
    }

    Ok(outcome)
}

fn failure_reason(status: u16, error: Option<&Value>) -> String {
    let Some(error) = error else {
        return format!("status {status}");
    };

    match (error.get("type"), error.get("reason")) {
        (Some(Value::String(kind)), Some(Value::String(reason))) => format!("{kind}: {reason}"),
        (Some(Value::String(kind)), _) => kind.clone(),
        _ => error.to_string(),
    }
}

fn is_index_exists_error(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("type"))
                .and_then(Value::as_str)
                .map(|kind| kind == INDEX_EXISTS_ERROR_TYPE)
        })
        .unwrap_or(false)
}

/// Maps an unsuccessful HTTP status to an error, treating overload and gateway failures as
/// connection problems so that they are retried.
fn status_error(status: StatusCode, description: &'static str, body: &str) -> EtlError {
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ErrorKind::DestinationConnectionFailed,
        _ => ErrorKind::DestinationQueryFailed,
    };

    etl_error!(kind, description, format!("status {status}: {body}"))
}

fn serialization_error(err: serde_json::Error) -> EtlError {
    etl_error!(
        ErrorKind::SerializationError,
        "Bulk request encoding failed",
        err
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str) -> IndexDocument {
        IndexDocument {
            id: id.to_owned(),
            source: json!({ "title": format!("movie {id}") }),
        }
    }

    #[test]
    fn bulk_body_pairs_actions_with_sources() {
        let body = encode_bulk_body("movies", &[document("a"), document("b")]).unwrap();
        let lines: Vec<Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert!(body.ends_with('\n'));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["index"]["_id"], "a");
        assert_eq!(lines[0]["index"]["_index"], "movies");
        assert_eq!(lines[1]["title"], "movie a");
        assert_eq!(lines[2]["index"]["_id"], "b");
    }

    #[test]
    fn bulk_response_reports_rejected_items() {
        let body = json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_index": "movies", "_id": "a", "status": 201 } },
                { "index": { "_index": "movies", "_id": "b", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [imdb_rating]"
                } } }
            ]
        });

        let outcome =
            parse_bulk_response(body.to_string().as_bytes(), &[document("a"), document("b")])
                .unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(
            outcome.failures,
            vec![DocumentFailure {
                id: "b".to_owned(),
                reason: "mapper_parsing_exception: failed to parse field [imdb_rating]".to_owned(),
            }]
        );
    }

    #[test]
    fn bulk_response_with_missing_items_is_invalid() {
        let body = json!({ "errors": false, "items": [] });

        let err = parse_bulk_response(body.to_string().as_bytes(), &[document("a")]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn index_exists_error_is_recognized() {
        let body = json!({
            "error": { "type": "resource_already_exists_exception", "reason": "index [movies/x] already exists" },
            "status": 400
        });

        assert!(is_index_exists_error(&body.to_string()));
        assert!(!is_index_exists_error("not json"));
    }

    #[test]
    fn overload_statuses_are_retryable() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "Bulk request failed", "");
        assert!(err.kind().is_connection_retryable());

        let err = status_error(StatusCode::BAD_REQUEST, "Bulk request failed", "");
        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    }
}
