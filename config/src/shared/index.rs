use serde::Deserialize;
use std::path::PathBuf;

use crate::shared::ValidationError;

/// Search index endpoint and index names.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexConfig {
    /// Base url of the search cluster, e.g. `http://127.0.0.1:9200`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Index receiving the denormalized movie documents.
    #[serde(default = "default_movies_index")]
    pub movies_index: String,
    /// Index receiving person documents. Person documents are not written when unset.
    #[serde(default)]
    pub persons_index: Option<String>,
    /// Index receiving genre documents. Genre documents are not written when unset.
    #[serde(default)]
    pub genres_index: Option<String>,
    /// Directory holding `<index>.json` schema files used when creating the indices.
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

fn default_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_movies_index() -> String {
    "movies".to_string()
}

impl IndexConfig {
    /// Returns every configured index name, movies first.
    pub fn index_names(&self) -> Vec<&str> {
        let mut names = vec![self.movies_index.as_str()];
        names.extend(self.persons_index.as_deref());
        names.extend(self.genres_index.as_deref());

        names
    }

    /// Returns the schema file path for `index`, if a schema directory is configured.
    pub fn schema_path(&self, index: &str) -> Option<PathBuf> {
        self.schema_dir
            .as_ref()
            .map(|dir| dir.join(format!("{index}.json")))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::EmptyField("index.url".to_string()));
        }
        let names = self.index_names();
        for (position, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(ValidationError::EmptyField("index name".to_string()));
            }
            if names[..position].contains(name) {
                return Err(ValidationError::InvalidFieldValue {
                    field: "index".to_string(),
                    constraint: format!("index `{name}` is configured more than once"),
                });
            }
        }

        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            movies_index: default_movies_index(),
            persons_index: None,
            genres_index: None,
            schema_dir: None,
        }
    }
}
