use movies_config::shared::{IntoConnectOptions, PgConnectionConfig};
use movies_postgres::content;
use movies_postgres::schema::ContentSchema;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::retry::RetryPolicy;
use crate::source::Source;
use crate::types::{
    ChangeRow, EntityId, EntityType, GenreFilmRow, JoinedRow, MovieRef, PersonCreditRow, Watermark,
};

/// The sync loop issues one query at a time.
const MAX_CONNECTIONS: u32 = 1;

/// [`Source`] backed by a Postgres connection pool.
///
/// Every query runs under the [`RetryPolicy`], so dropped connections and unavailable servers are
/// retried while query errors are returned right away.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
    schema: ContentSchema,
    retry: RetryPolicy,
}

impl PgSource {
    /// Connects to the database described by `config`, retrying until the server is reachable.
    pub async fn connect(config: &PgConnectionConfig, retry: RetryPolicy) -> EtlResult<Self> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "connecting to source database"
        );

        let pool = retry
            .run("connect to source", || async {
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_with(config.with_db())
                    .await?;

                Ok(pool)
            })
            .await?;

        Ok(Self::from_pool(pool, ContentSchema::new(&config.schema), retry))
    }

    pub fn from_pool(pool: PgPool, schema: ContentSchema, retry: RetryPolicy) -> Self {
        Self {
            pool,
            schema,
            retry,
        }
    }
}

impl Source for PgSource {
    fn name() -> &'static str {
        "postgres"
    }

    async fn scan_changes(
        &self,
        entity: EntityType,
        after: &Watermark,
        limit: u32,
    ) -> EtlResult<Vec<ChangeRow>> {
        let cursor = after.to_cursor();

        let rows = self
            .retry
            .run("scan changes", || async {
                let rows = content::get_changed_rows(
                    &self.pool,
                    &self.schema,
                    entity.table(),
                    cursor,
                    i64::from(limit),
                )
                .await?;

                Ok(rows)
            })
            .await?;

        debug!(%entity, %after, rows = rows.len(), "scanned changed rows");

        Ok(rows.into_iter().map(ChangeRow::from).collect())
    }

    async fn linked_movies(
        &self,
        entity: EntityType,
        ids: &[EntityId],
        after: &Watermark,
        limit: u32,
    ) -> EtlResult<Vec<MovieRef>> {
        let Some(association) = entity.association() else {
            bail!(
                ErrorKind::InvalidState,
                "Movies are not linked through an association table",
                format!("entity `{entity}`")
            );
        };
        let cursor = after.to_cursor();

        let rows = self
            .retry
            .run("resolve linked movies", || async {
                let rows = content::get_linked_film_works(
                    &self.pool,
                    &self.schema,
                    association,
                    ids,
                    cursor,
                    i64::from(limit),
                )
                .await?;

                Ok(rows)
            })
            .await?;

        debug!(%entity, %after, ids = ids.len(), movies = rows.len(), "resolved linked movies");

        Ok(rows.into_iter().map(MovieRef::from).collect())
    }

    async fn movie_rows(&self, ids: &[EntityId]) -> EtlResult<Vec<JoinedRow>> {
        let rows = self
            .retry
            .run("load movie rows", || async {
                let rows = content::get_film_work_rows(&self.pool, &self.schema, ids).await?;

                Ok(rows)
            })
            .await?;

        Ok(rows.into_iter().map(JoinedRow::from).collect())
    }

    async fn person_rows(&self, ids: &[EntityId]) -> EtlResult<Vec<PersonCreditRow>> {
        let rows = self
            .retry
            .run("load person rows", || async {
                let rows = content::get_person_rows(&self.pool, &self.schema, ids).await?;

                Ok(rows)
            })
            .await?;

        Ok(rows.into_iter().map(PersonCreditRow::from).collect())
    }

    async fn genre_rows(&self, ids: &[EntityId]) -> EtlResult<Vec<GenreFilmRow>> {
        let rows = self
            .retry
            .run("load genre rows", || async {
                let rows = content::get_genre_rows(&self.pool, &self.schema, ids).await?;

                Ok(rows)
            })
            .await?;

        Ok(rows.into_iter().map(GenreFilmRow::from).collect())
    }

    async fn close(&self) {
        info!("closing source connection pool");
        self.pool.close().await;
    }
}
