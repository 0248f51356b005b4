//! Network status observer
//!
//! Forwards an injected online/offline signal into the sync status. The
//! observer owns its forwarding task and stops it when dropped.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::status::StatusPublisher;

/// Keeps `is_online` in step with a connectivity signal
#[derive(Debug)]
pub struct NetworkObserver {
    task: JoinHandle<()>,
}

impl NetworkObserver {
    /// Start forwarding `online` into `status`
    pub fn spawn(mut online: watch::Receiver<bool>, status: StatusPublisher) -> Self {
        let task = tokio::spawn(async move {
            loop {
                let is_online = *online.borrow_and_update();
                status.update(|s| s.is_online = is_online);
                info!("Network is {}", if is_online { "online" } else { "offline" });

                if online.changed().await.is_err() {
                    break;
                }
            }
        });

        Self { task }
    }
}

impl Drop for NetworkObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for(status: &StatusPublisher, online: bool) {
        let mut rx = status.subscribe();
        rx.wait_for(|s| s.is_online == online).await.unwrap();
    }

    #[tokio::test]
    async fn test_forwards_online_changes() {
        let (tx, rx) = watch::channel(false);
        let status = StatusPublisher::default();
        let _observer = NetworkObserver::spawn(rx, status.clone());

        wait_for(&status, false).await;
        tx.send(true).unwrap();
        wait_for(&status, true).await;
    }

    #[tokio::test]
    async fn test_drop_stops_forwarding() {
        let (tx, rx) = watch::channel(true);
        let status = StatusPublisher::default();
        let observer = NetworkObserver::spawn(rx, status.clone());
        wait_for(&status, true).await;

        drop(observer);
        tokio::task::yield_now().await;
        let _ = tx.send(false);
        tokio::task::yield_now().await;
        assert!(status.current().is_online);
    }
}
