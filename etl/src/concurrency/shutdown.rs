use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::EtlResult;

/// Receiver side of the shutdown signal.
pub type ShutdownRx = watch::Receiver<()>;

/// Sender side of the shutdown signal.
///
/// Cloning shares the same underlying channel, so any clone can stop every subscriber.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<()>>);

impl ShutdownTx {
    /// Notifies every subscriber that the process should stop.
    ///
    /// Sending never fails even when no receiver is alive.
    pub fn shutdown(&self) {
        self.0.send_replace(());
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a shutdown channel whose receivers start in the unchanged state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(Arc::new(tx)), rx)
}

/// Returns `true` once shutdown was requested or the sender was dropped.
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    shutdown_rx.has_changed().unwrap_or(true)
}

/// Drives `future` to completion unless shutdown is requested first.
///
/// Returns `Ok(None)` when the shutdown signal wins the race. A dropped sender counts as a
/// shutdown request.
pub async fn interruptible<F, T>(shutdown_rx: &ShutdownRx, future: F) -> EtlResult<Option<T>>
where
    F: Future<Output = EtlResult<T>>,
{
    if is_shutdown_requested(shutdown_rx) {
        return Ok(None);
    }

    let mut shutdown_rx = shutdown_rx.clone();
    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => Ok(None),
        result = future => result.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn completes_when_not_interrupted() {
        let (_tx, rx) = create_shutdown_channel();

        let result = interruptible(&rx, async { Ok(42) }).await.unwrap();

        assert_eq!(result, Some(42));
        assert!(!is_shutdown_requested(&rx));
    }

    #[tokio::test]
    async fn returns_none_after_shutdown() {
        let (tx, rx) = create_shutdown_channel();
        tx.shutdown();

        let result = interruptible(&rx, async { Ok(42) }).await.unwrap();

        assert_eq!(result, None);
        assert!(is_shutdown_requested(&rx));
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_future() {
        let (tx, rx) = create_shutdown_channel();

        let handle = tokio::spawn(async move {
            interruptible(&rx, async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await
        });
        tokio::task::yield_now().await;
        tx.shutdown();

        assert_eq!(handle.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (tx, rx) = create_shutdown_channel();
        drop(tx);

        assert!(is_shutdown_requested(&rx));
    }
}
