use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Session settings applied to every source connection.
const SESSION_OPTIONS: &[(&str, &str)] = &[
    ("application_name", "movies-replicator"),
    ("timezone", "UTC"),
];

/// Configuration for connecting to the source Postgres database.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port on which the Postgres server is listening.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the database holding the content schema.
    pub name: String,
    /// Username used to authenticate.
    pub username: String,
    /// Password of `username`, redacted in debug output.
    #[serde(default)]
    pub password: Option<SerializableSecretString>,
    /// Schema containing the `film_work`, `person` and `genre` tables.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Whether TLS is required for the connection.
    #[serde(default)]
    pub require_tls: bool,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "content".to_string()
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyField("source.host".to_string()));
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyField("source.name".to_string()));
        }
        if self.schema.is_empty() {
            return Err(ValidationError::EmptyField("source.schema".to_string()));
        }

        Ok(())
    }
}

/// Converts a connection config into crate specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options for connecting to the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options for connecting to the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_tls {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .ssl_mode(ssl_mode)
            .options(SESSION_OPTIONS.iter().copied());

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.name)
    }
}
