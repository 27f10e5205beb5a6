use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::Source;
use crate::types::{EntityId, EntityType, MovieRef, Watermark};

/// Maps changed persons or genres to the movies embedding them.
#[derive(Debug, Clone)]
pub struct CascadeResolver<Src> {
    source: Src,
    limit: u32,
}

impl<Src> CascadeResolver<Src>
where
    Src: Source,
{
    pub fn new(source: Src, limit: u32) -> Self {
        Self { source, limit }
    }

    /// Returns up to `limit` distinct movies linked to `ids` whose cursor sorts after
    /// `cascade_watermark`, in ascending cursor order.
    pub async fn resolve_movies(
        &self,
        entity: EntityType,
        ids: &[EntityId],
        cascade_watermark: &Watermark,
    ) -> EtlResult<Vec<MovieRef>> {
        if !entity.is_dimension() {
            bail!(
                ErrorKind::InvalidState,
                "Cascade resolution only applies to persons and genres",
                format!("entity `{entity}`")
            );
        }

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let movies = self
            .source
            .linked_movies(entity, ids, cascade_watermark, self.limit)
            .await?;

        debug!(
            %entity,
            %cascade_watermark,
            ids = ids.len(),
            movies = movies.len(),
            "cascade resolved"
        );

        Ok(movies)
    }
}
