use movies_config::shared::{DestinationConfig, ReplicatorConfig, StateStoreConfig};
use movies_etl::destination::Destination;
use movies_etl::destination::elasticsearch::ElasticsearchDestination;
use movies_etl::destination::memory::MemoryDestination;
use movies_etl::pipeline::Pipeline;
use movies_etl::retry::RetryPolicy;
use movies_etl::source::Source;
use movies_etl::source::postgres::PgSource;
use movies_etl::store::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};
use tracing::{error, info, warn};

use crate::error::ReplicatorResult;

// Builds the pipeline for a concrete store and destination pair and runs it.
macro_rules! start_pipeline_dispatch {
    ($config:expr, $source:expr, $store:expr, $destination:expr) => {{
        let pipeline = Pipeline::new(
            $config.pipeline.clone(),
            $config.index.clone(),
            $source.clone(),
            $store,
            $destination,
        );
        start_pipeline(pipeline).await
    }};
}

/// Connects to the source and runs the sync loop until shutdown or `max_iterations`.
///
/// Store and destination are picked from the configuration and dispatched statically.
pub async fn start_replicator_with_config(config: ReplicatorConfig) -> ReplicatorResult<()> {
    let retry = RetryPolicy::from(&config.pipeline.retry);
    let source = PgSource::connect(&config.source, retry).await?;

    let result = match (&config.state_store, &config.destination) {
        (StateStoreConfig::Memory, DestinationConfig::Memory) => {
            start_pipeline_dispatch!(
                config,
                source,
                MemoryWatermarkStore::new(),
                MemoryDestination::new()
            )
        }
        (StateStoreConfig::Memory, DestinationConfig::Elasticsearch) => {
            let destination = ElasticsearchDestination::new(&config.index.url)?;
            start_pipeline_dispatch!(config, source, MemoryWatermarkStore::new(), destination)
        }
        (StateStoreConfig::File { path }, DestinationConfig::Memory) => {
            start_pipeline_dispatch!(
                config,
                source,
                FileWatermarkStore::new(path),
                MemoryDestination::new()
            )
        }
        (StateStoreConfig::File { path }, DestinationConfig::Elasticsearch) => {
            let destination = ElasticsearchDestination::new(&config.index.url)?;
            start_pipeline_dispatch!(config, source, FileWatermarkStore::new(path), destination)
        }
    };

    source.close().await;

    result
}

async fn start_pipeline<S, D>(pipeline: Pipeline<PgSource, S, D>) -> ReplicatorResult<()>
where
    S: WatermarkStore + Send + Sync,
    D: Destination + Send + Sync,
{
    pipeline.prepare().await?;

    // Spawn a task to listen for Ctrl+C and trigger shutdown.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl+c");
            return;
        }

        info!("ctrl+c received, shutting down");
        shutdown_tx.shutdown();
    });

    let result = pipeline.run().await;

    // The pipeline may stop on its own, in which case the listener is no longer needed.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    if let Err(err) = pipeline.shutdown().await {
        warn!(error = %err, "failed to shut down destination");
    }

    let iterations = result?;
    info!(iterations, "replicator stopped");

    Ok(())
}
