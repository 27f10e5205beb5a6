//! Movies search replicator binary.
//!
//! Loads the configuration, sets up logging and keeps the search indices in sync with the content
//! database until interrupted.

use tracing::{error, info};

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::ReplicatorResult;
use crate::logging::init_tracing;

mod config;
mod core;
mod error;
mod logging;

fn main() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    // Keeps the background log writer alive until the process exits.
    let _log_flusher = init_tracing(&replicator_config.log)?;

    info!(
        destination = ?replicator_config.destination,
        state_store = ?replicator_config.state_store,
        "starting replicator"
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if let Err(err) = start_replicator_with_config(replicator_config).await {
                error!(category = err.category(), "{err}");
                return Err(err);
            }

            Ok(())
        })
}
