use tracing::debug;

use crate::error::EtlResult;
use crate::source::Source;
use crate::types::{ChangeRow, EntityType, Watermark};

/// Finds the rows of an entity table changed after a watermark, one bounded batch at a time.
#[derive(Debug, Clone)]
pub struct ChangeScanner<Src> {
    source: Src,
    limit: u32,
}

impl<Src> ChangeScanner<Src>
where
    Src: Source,
{
    pub fn new(source: Src, limit: u32) -> Self {
        Self { source, limit }
    }

    /// Returns up to `limit` rows of `entity` sorting after `watermark`, in ascending cursor order.
    ///
    /// An empty batch means the entity is caught up.
    pub async fn scan(&self, entity: EntityType, watermark: &Watermark) -> EtlResult<Vec<ChangeRow>> {
        let rows = self
            .source
            .scan_changes(entity, watermark, self.limit)
            .await?;

        debug!(%entity, %watermark, rows = rows.len(), "change scan completed");

        Ok(rows)
    }
}
