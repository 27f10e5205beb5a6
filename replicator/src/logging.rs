use std::fs::OpenOptions;

use movies_config::shared::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{ReplicatorError, ReplicatorResult};

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber, honoring `RUST_LOG` and defaulting to `info`.
///
/// Logs go to stdout unless a log file is configured, in which case they are appended to it
/// through a background writer. The returned guard flushes that writer when dropped.
pub fn init_tracing(config: &LogConfig) -> ReplicatorResult<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(filter),
                )
                .try_init()
                .map_err(ReplicatorError::config)?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(filter))
                .try_init()
                .map_err(ReplicatorError::config)?;

            Ok(None)
        }
    }
}
