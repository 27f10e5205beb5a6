//! The sync loop: scan, cascade, denormalize, write and advance watermarks for every entity type.

use std::collections::BTreeMap;
use std::sync::Arc;

use movies_config::shared::{IndexConfig, PipelineConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cascade::CascadeResolver;
use crate::concurrency::shutdown::{
    ShutdownRx, ShutdownTx, create_shutdown_channel, interruptible, is_shutdown_requested,
};
use crate::denormalize::Denormalizer;
use crate::destination::Destination;
use crate::destination::writer::IndexWriter;
use crate::error::{ErrorKind, EtlResult};
use crate::retry::RetryPolicy;
use crate::scan::ChangeScanner;
use crate::source::Source;
use crate::store::WatermarkStore;
use crate::types::{CASCADE_WATERMARK_KEY, ChangeRow, EntityId, EntityType, Watermark};

/// How the sync of one entity type ended within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySyncStatus {
    /// Every change visible at scan time was written and its watermark committed.
    CaughtUp,
    /// Shutdown was requested; the batch in flight was not committed.
    Interrupted,
    /// The index rejected some documents; the watermark stays put until the next iteration.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySyncReport {
    pub entity: EntityType,
    pub status: EntitySyncStatus,
    pub rows_scanned: usize,
    pub documents_written: usize,
}

impl EntitySyncReport {
    fn new(entity: EntityType) -> Self {
        Self {
            entity,
            status: EntitySyncStatus::CaughtUp,
            rows_scanned: 0,
            documents_written: 0,
        }
    }
}

/// Summary of one pass over every entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub entities: Vec<EntitySyncReport>,
}

impl IterationReport {
    pub fn is_interrupted(&self) -> bool {
        self.entities
            .iter()
            .any(|report| report.status == EntitySyncStatus::Interrupted)
    }

    pub fn rows_scanned(&self) -> usize {
        self.entities.iter().map(|report| report.rows_scanned).sum()
    }

    pub fn documents_written(&self) -> usize {
        self.entities
            .iter()
            .map(|report| report.documents_written)
            .sum()
    }

    pub fn entity(&self, entity: EntityType) -> Option<&EntitySyncReport> {
        self.entities.iter().find(|report| report.entity == entity)
    }
}

/// Keeps the search indices in sync with the content tables.
///
/// Each iteration visits [`EntityType::ALL`] in order. Movies changed after their watermark are
/// re-indexed directly. For persons and genres, the movies linked to each changed batch are
/// re-indexed through the cascade cursor before the entity watermark moves. Watermarks are only
/// committed once the index acknowledged every document of the batch, so a crash or a rejected
/// write leads to a replay rather than a gap.
#[derive(Debug)]
pub struct Pipeline<Src, S, D> {
    config: Arc<PipelineConfig>,
    indices: Arc<IndexConfig>,
    scanner: ChangeScanner<Src>,
    resolver: CascadeResolver<Src>,
    denormalizer: Denormalizer<Src>,
    writer: IndexWriter<D>,
    store: S,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<Src, S, D> Pipeline<Src, S, D>
where
    Src: Source + Clone + Send + Sync,
    S: WatermarkStore + Send + Sync,
    D: Destination + Send + Sync,
{
    pub fn new(
        config: PipelineConfig,
        indices: IndexConfig,
        source: Src,
        store: S,
        destination: D,
    ) -> Self {
        // The pipeline keeps its own receiver, which is never marked as seen, so a shutdown
        // requested at any time is observed by every later check.
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let retry = RetryPolicy::from(&config.retry);

        Self {
            scanner: ChangeScanner::new(source.clone(), config.scan_limit),
            resolver: CascadeResolver::new(source.clone(), config.scan_limit),
            denormalizer: Denormalizer::new(source),
            writer: IndexWriter::new(destination, retry),
            config: Arc::new(config),
            indices: Arc::new(indices),
            store,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the configured indices, keeping the ones that already exist.
    pub async fn prepare(&self) -> EtlResult<()> {
        interruptible(&self.shutdown_rx, self.writer.bootstrap(&self.indices)).await?;

        Ok(())
    }

    /// Runs iterations until shutdown is requested or `max_iterations` is reached, sleeping
    /// `poll_interval_ms` between them.
    ///
    /// Returns the number of completed iterations.
    pub async fn run(&self) -> EtlResult<u64> {
        info!(
            scan_limit = self.config.scan_limit,
            poll_interval_ms = self.config.poll_interval_ms,
            max_iterations = ?self.config.max_iterations,
            "starting sync loop"
        );

        let mut completed: u64 = 0;
        loop {
            if is_shutdown_requested(&self.shutdown_rx) {
                break;
            }

            let report = self.run_iteration().await?;
            if report.is_interrupted() {
                break;
            }
            completed += 1;

            if self
                .config
                .max_iterations
                .is_some_and(|max_iterations| completed >= max_iterations)
            {
                info!(iterations = completed, "maximum number of iterations reached");
                break;
            }

            let poll_interval = self.config.poll_interval();
            if poll_interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            let slept = interruptible(&self.shutdown_rx, async {
                tokio::time::sleep(poll_interval).await;
                Ok(())
            })
            .await?;
            if slept.is_none() {
                break;
            }
        }

        info!(iterations = completed, "sync loop stopped");

        Ok(completed)
    }

    /// Syncs every entity type once, in [`EntityType::ALL`] order.
    ///
    /// Stops early, without visiting the remaining entity types, when shutdown is requested.
    pub async fn run_iteration(&self) -> EtlResult<IterationReport> {
        let mut report = IterationReport::default();

        for entity in EntityType::ALL {
            let entity_report = self.sync_entity(entity).await?;
            let interrupted = entity_report.status == EntitySyncStatus::Interrupted;
            report.entities.push(entity_report);

            if interrupted {
                info!(%entity, "iteration interrupted by shutdown");
                return Ok(report);
            }
        }

        info!(
            rows_scanned = report.rows_scanned(),
            documents_written = report.documents_written(),
            "iteration completed"
        );

        Ok(report)
    }

    /// Syncs `entity` until its scan comes back empty.
    ///
    /// A partial write defers the entity to the next iteration. Any other error is returned.
    pub async fn sync_entity(&self, entity: EntityType) -> EtlResult<EntitySyncReport> {
        let mut report = EntitySyncReport::new(entity);

        match self.drain_entity(entity, &mut report).await {
            Ok(status) => {
                report.status = status;
            }
            Err(err) if err.kind() == ErrorKind::DestinationPartialWrite => {
                warn!(%entity, error = %err, "partial write, deferring entity to the next iteration");
                report.status = EntitySyncStatus::Deferred;
            }
            Err(err) => return Err(err),
        }

        debug!(
            %entity,
            status = ?report.status,
            rows_scanned = report.rows_scanned,
            documents_written = report.documents_written,
            "entity sync finished"
        );

        Ok(report)
    }

    /// Releases the destination.
    pub async fn shutdown(&self) -> EtlResult<()> {
        self.writer.destination().shutdown().await
    }

    async fn drain_entity(
        &self,
        entity: EntityType,
        report: &mut EntitySyncReport,
    ) -> EtlResult<EntitySyncStatus> {
        let watermark_key = entity.watermark_key();

        loop {
            let watermark = self
                .store
                .get(watermark_key)
                .await?
                .unwrap_or_else(Watermark::sentinel);

            let Some(rows) =
                interruptible(&self.shutdown_rx, self.scanner.scan(entity, &watermark)).await?
            else {
                return Ok(EntitySyncStatus::Interrupted);
            };
            let Some(last_row) = rows.last().copied() else {
                return Ok(EntitySyncStatus::CaughtUp);
            };
            report.rows_scanned += rows.len();

            let written_before = report.documents_written;
            let completed = match entity {
                EntityType::Movie => self.sync_movies(&rows, report).await?,
                EntityType::Person | EntityType::Genre => {
                    self.sync_dimension(entity, &rows, report).await?
                }
            };
            if !completed || is_shutdown_requested(&self.shutdown_rx) {
                return Ok(EntitySyncStatus::Interrupted);
            }
            self.advance_watermark(entity, last_row.watermark()).await?;

            info!(
                %entity,
                rows = rows.len(),
                documents = report.documents_written - written_before,
                watermark = %last_row.watermark(),
                "batch synced"
            );
        }
    }

    /// Re-indexes the scanned movies. Returns `false` when interrupted.
    async fn sync_movies(
        &self,
        rows: &[ChangeRow],
        report: &mut EntitySyncReport,
    ) -> EtlResult<bool> {
        let ids: Vec<EntityId> = rows.iter().map(|row| row.id).collect();

        let Some(documents) =
            interruptible(&self.shutdown_rx, self.denormalizer.denormalize(&ids)).await?
        else {
            return Ok(false);
        };

        self.write(&self.indices.movies_index, &documents, report)
            .await
    }

    /// Re-indexes every movie linked to the scanned persons or genres, then the dimension
    /// documents themselves when their index is configured. Returns `false` when interrupted.
    ///
    /// Every acknowledged write is counted in `report`, even when a later one fails.
    async fn sync_dimension(
        &self,
        entity: EntityType,
        rows: &[ChangeRow],
        report: &mut EntitySyncReport,
    ) -> EtlResult<bool> {
        let ids: Vec<EntityId> = rows.iter().map(|row| row.id).collect();

        self.store
            .set(CASCADE_WATERMARK_KEY, Watermark::sentinel())
            .await?;

        loop {
            let cascade_watermark = self
                .store
                .get(CASCADE_WATERMARK_KEY)
                .await?
                .unwrap_or_else(Watermark::sentinel);

            let Some(movies) = interruptible(
                &self.shutdown_rx,
                self.resolver
                    .resolve_movies(entity, &ids, &cascade_watermark),
            )
            .await?
            else {
                return Ok(false);
            };
            let Some(last_movie) = movies.last().copied() else {
                break;
            };

            let movie_ids: Vec<EntityId> = movies.iter().map(|movie| movie.id).collect();
            let Some(documents) =
                interruptible(&self.shutdown_rx, self.denormalizer.denormalize(&movie_ids))
                    .await?
            else {
                return Ok(false);
            };

            if !self
                .write(&self.indices.movies_index, &documents, report)
                .await?
                || is_shutdown_requested(&self.shutdown_rx)
            {
                return Ok(false);
            }
            self.store
                .set(CASCADE_WATERMARK_KEY, last_movie.watermark())
                .await?;

            debug!(
                %entity,
                movies = movies.len(),
                cascade_watermark = %last_movie.watermark(),
                "cascade batch synced"
            );
        }

        self.sync_dimension_documents(entity, &ids, report).await
    }

    async fn sync_dimension_documents(
        &self,
        entity: EntityType,
        ids: &[EntityId],
        report: &mut EntitySyncReport,
    ) -> EtlResult<bool> {
        match entity {
            EntityType::Person => {
                let Some(index) = self.indices.persons_index.as_deref() else {
                    return Ok(true);
                };
                let Some(documents) = interruptible(
                    &self.shutdown_rx,
                    self.denormalizer.denormalize_persons(ids),
                )
                .await?
                else {
                    return Ok(false);
                };

                self.write(index, &documents, report).await
            }
            EntityType::Genre => {
                let Some(index) = self.indices.genres_index.as_deref() else {
                    return Ok(true);
                };
                let Some(documents) = interruptible(
                    &self.shutdown_rx,
                    self.denormalizer.denormalize_genres(ids),
                )
                .await?
                else {
                    return Ok(false);
                };

                self.write(index, &documents, report).await
            }
            EntityType::Movie => Ok(true),
        }
    }

    /// Upserts `documents` and counts them in `report`. Returns `false` when interrupted.
    async fn write<T>(
        &self,
        index: &str,
        documents: &BTreeMap<EntityId, T>,
        report: &mut EntitySyncReport,
    ) -> EtlResult<bool>
    where
        T: Serialize + Sync,
    {
        let Some(outcome) =
            interruptible(&self.shutdown_rx, self.writer.upsert(index, documents)).await?
        else {
            return Ok(false);
        };
        report.documents_written += outcome.written;

        Ok(true)
    }

    /// Commits `candidate` as the watermark of `entity` unless it would move it backwards.
    async fn advance_watermark(&self, entity: EntityType, candidate: Watermark) -> EtlResult<()> {
        let key = entity.watermark_key();

        if let Some(current) = self.store.get(key).await? {
            if candidate < current {
                warn!(
                    %entity,
                    %current,
                    %candidate,
                    "refusing to move watermark backwards"
                );
                return Ok(());
            }
        }

        self.store.set(key, candidate).await
    }
}
