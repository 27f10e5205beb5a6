use serde::Deserialize;

/// Which search index implementation receives the documents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Documents are kept in memory, useful for local runs without a search cluster.
    Memory,
    /// Documents are written to an Elasticsearch compatible cluster at [`crate::shared::IndexConfig::url`].
    #[default]
    Elasticsearch,
}
