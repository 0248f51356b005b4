//! Replication controller
//!
//! Owns the remote handle and the live replication for the active local
//! store. Lifecycle changes run under one lock, so at most one live
//! replication exists and starting a new one always stops the previous one.
//! Remote probes run outside that lock and are only adopted if their
//! [`Lease`] is still current afterwards.
//!
//! Failures never escape: they are classified and published as
//! [`SyncStatus::error`](super::status::SyncStatus) instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::generation::Lease;
use super::items_for_direction;
use super::status::{StatusPublisher, SyncProgress};
use crate::config::{Config, Credentials};
use crate::error::SyncResult;
use crate::remote::{resolve_remote_url, RemoteConnector, UrlMode};
use crate::replication::{LiveReplication, LiveReplicationConfig, ReplicationEvent, ReplicationPeer};
use crate::storage::LocalStore;

/// How long progress stays visible after the last transferred batch
pub const PROGRESS_CLEAR_DELAY: Duration = Duration::from_secs(2);

/// Where and how to reach the remote store
#[derive(Debug, Clone, Default)]
pub struct RemoteSettings {
    /// Origin the remote URL is derived from
    pub app_origin: Option<String>,
    /// Fixed remote URL, takes precedence over the origin
    pub remote_url: Option<String>,
    pub url_mode: UrlMode,
    pub credentials: Option<Credentials>,
    pub live: LiveReplicationConfig,
}

impl RemoteSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_origin: config.app_origin.clone(),
            remote_url: config.remote_url.clone(),
            url_mode: config.url_mode,
            credentials: config.credentials(),
            live: LiveReplicationConfig {
                poll_interval: config.live_poll_interval(),
                ..Default::default()
            },
        }
    }

    /// Remote URL for `store_name`; `None` means sync is not configured
    pub fn resolve_url(&self, store_name: &str, url_override: Option<&str>) -> Option<String> {
        if let Some(url) = url_override.or(self.remote_url.as_deref()) {
            return Some(url.to_string());
        }
        let origin = self.app_origin.as_deref()?;
        resolve_remote_url(origin, store_name, self.url_mode)
    }
}

struct LiveSession {
    replication: LiveReplication,
    listener: JoinHandle<()>,
}

#[derive(Default)]
struct ControllerState {
    remote: Option<Arc<dyn ReplicationPeer>>,
    live: Option<LiveSession>,
}

/// Manages the remote handle and live replication
pub struct ReplicationController {
    settings: RemoteSettings,
    connector: Arc<dyn RemoteConnector>,
    status: StatusPublisher,
    state: Mutex<ControllerState>,
}

impl ReplicationController {
    pub fn new(
        settings: RemoteSettings,
        connector: Arc<dyn RemoteConnector>,
        status: StatusPublisher,
    ) -> Self {
        Self {
            settings,
            connector,
            status,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Current remote handle, if one is established
    pub async fn remote(&self) -> Option<Arc<dyn ReplicationPeer>> {
        self.state.lock().await.remote.clone()
    }

    pub async fn is_live(&self) -> bool {
        self.state.lock().await.live.is_some()
    }

    /// Establish the remote handle for `local` without starting replication
    ///
    /// Returns whether a reachable remote is now available.
    pub async fn connect(
        &self,
        local: &LocalStore,
        lease: &Lease,
        url_override: Option<&str>,
    ) -> bool {
        self.establish(local, lease, url_override).await.is_some()
    }

    /// Start live replication between `local` and its remote
    ///
    /// Any previous live replication is stopped first. Returns whether a new
    /// replication was started.
    pub async fn start_live_sync(
        &self,
        local: Arc<LocalStore>,
        lease: &Lease,
        url_override: Option<&str>,
    ) -> bool {
        {
            let mut state = self.state.lock().await;
            if !lease.is_current() {
                debug!("Skipping live sync setup for superseded store {}", local.name());
                return false;
            }
            self.stop_locked(&mut state).await;
        }

        let Some((mut state, remote)) = self.establish(&local, lease, url_override).await else {
            return false;
        };

        // Another start may have won the race while the remote was probed
        self.stop_locked(&mut state).await;

        info!("Starting live sync for {} with {}", local.name(), remote.name());
        let mut replication = LiveReplication::spawn(local, remote, self.settings.live.clone());
        let listener = match replication.take_events() {
            Some(events) => tokio::spawn(forward_events(events, self.status.clone())),
            None => tokio::spawn(async {}),
        };

        state.live = Some(LiveSession {
            replication,
            listener,
        });
        true
    }

    /// Stop live replication, if any
    pub async fn stop_live_sync(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    /// Stop live replication and drop the remote handle
    ///
    /// Setups still probing for an older lease find it superseded and give up.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
        state.remote = None;
        self.status.update(|s| s.is_connecting = false);
    }

    async fn stop_locked(&self, state: &mut ControllerState) {
        let Some(session) = state.live.take() else {
            return;
        };

        // Detach the listener first so a cancelled replication cannot touch the status
        session.listener.abort();
        session.replication.cancel().await;

        self.status.update(|s| {
            s.is_syncing = false;
            s.sync_progress = None;
        });
        debug!("Live sync stopped");
    }

    /// Probe the remote of `local` and adopt it if the lease still holds
    ///
    /// The probe runs without the state lock; the returned guard is taken
    /// after it, with the lease and the store re-checked.
    async fn establish(
        &self,
        local: &LocalStore,
        lease: &Lease,
        url_override: Option<&str>,
    ) -> Option<(MutexGuard<'_, ControllerState>, Arc<dyn ReplicationPeer>)> {
        let Some(url) = self.settings.resolve_url(local.name(), url_override) else {
            debug!("No remote configured for {}, sync disabled", local.name());
            return None;
        };

        {
            let _state = self.state.lock().await;
            if !lease.is_current() {
                return None;
            }
            self.status.update(|s| {
                s.is_connecting = true;
                s.error = None;
            });
        }

        let probe = self.probe(&url).await;

        let mut state = self.state.lock().await;
        if !lease.is_current() || local.is_closed() {
            debug!("Store {} was replaced while connecting", local.name());
            return None;
        }

        match probe {
            Ok(remote) => {
                self.status.update(|s| s.is_connecting = false);
                state.remote = Some(Arc::clone(&remote));
                Some((state, remote))
            }
            Err(e) => {
                warn!("Remote {} unreachable: {}", url, e);
                state.remote = None;
                self.status.update(|s| {
                    s.is_connecting = false;
                    s.error = Some(e.user_message());
                });
                None
            }
        }
    }

    async fn probe(&self, url: &str) -> SyncResult<Arc<dyn ReplicationPeer>> {
        let remote = self
            .connector
            .connect(url, self.settings.credentials.as_ref())
            .await?;
        let info = remote.info().await?;
        debug!("Remote {} reachable ({} documents)", info.db_name, info.doc_count);
        Ok(remote)
    }
}

/// Apply replication events to the status until the channel closes
async fn forward_events(
    mut events: mpsc::UnboundedReceiver<ReplicationEvent>,
    status: StatusPublisher,
) {
    let mut clear_at: Option<Instant> = None;

    loop {
        let deadline = clear_at.unwrap_or_else(Instant::now);
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::time::sleep_until(deadline), if clear_at.is_some() => {
                clear_at = None;
                status.update(|s| s.sync_progress = None);
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };

        match event {
            ReplicationEvent::Active { pending } => {
                status.update(|s| {
                    s.is_syncing = true;
                    if let (Some(progress), Some(pending)) = (s.sync_progress.as_mut(), pending) {
                        progress.pending_docs = Some(pending);
                    }
                });
            }
            ReplicationEvent::Change(change) => {
                let count =
                    items_for_direction(change.direction, change.docs_read, change.docs_written);
                debug!("Live {} of {} documents", change.direction, count);
                status.update(|s| {
                    s.is_syncing = true;
                    s.sync_progress = Some(SyncProgress {
                        docs_processed: count,
                        total_docs: None,
                        operation: change.direction,
                        current_document: change.last_doc,
                        pending_docs: change.pending,
                    });
                });
                clear_at = Some(Instant::now() + PROGRESS_CLEAR_DELAY);
            }
            ReplicationEvent::Paused => {
                clear_at = None;
                status.update(|s| {
                    s.is_syncing = false;
                    s.sync_progress = None;
                    s.last_sync_at = Some(Utc::now());
                    s.error = None;
                });
            }
            ReplicationEvent::Error(message) => {
                warn!("Live sync error: {}", message);
                status.update(|s| {
                    s.is_syncing = false;
                    s.error = Some(message);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Document, DocumentSummary};
    use crate::replication::ChangeEvent;
    use crate::sync::generation::Generation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out the same in-process peer for every URL
    struct StaticConnector {
        remote: Arc<LocalStore>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl RemoteConnector for StaticConnector {
        async fn connect(
            &self,
            _url: &str,
            _credentials: Option<&Credentials>,
        ) -> SyncResult<Arc<dyn ReplicationPeer>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.remote.clone())
        }
    }

    /// Never finishes connecting within a test's patience
    struct SlowConnector {
        entered: tokio::sync::Notify,
    }

    #[async_trait]
    impl RemoteConnector for SlowConnector {
        async fn connect(
            &self,
            _url: &str,
            _credentials: Option<&Credentials>,
        ) -> SyncResult<Arc<dyn ReplicationPeer>> {
            self.entered.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(crate::error::SyncError::ConnectionTimeout)
        }
    }

    fn settings() -> RemoteSettings {
        RemoteSettings {
            remote_url: Some("http://localhost:5984/test".to_string()),
            live: LiveReplicationConfig {
                poll_interval: Duration::from_millis(50),
                initial_retry_delay: Duration::from_millis(10),
                max_retry_delay: Duration::from_millis(50),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn controller(
        remote: Arc<LocalStore>,
        settings: RemoteSettings,
    ) -> (ReplicationController, StatusPublisher) {
        let status = StatusPublisher::default();
        let connector = Arc::new(StaticConnector {
            remote,
            connects: AtomicUsize::new(0),
        });
        (
            ReplicationController::new(settings, connector, status.clone()),
            status,
        )
    }

    #[test]
    fn test_resolve_url_precedence() {
        let mut settings = RemoteSettings {
            app_origin: Some("http://localhost:3080".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve_url("stories", None).as_deref(),
            Some("http://localhost:3080/_db/stories")
        );

        settings.remote_url = Some("http://couch:5984/fixed".to_string());
        assert_eq!(
            settings.resolve_url("stories", None).as_deref(),
            Some("http://couch:5984/fixed")
        );
        assert_eq!(
            settings.resolve_url("stories", Some("http://other/db")).as_deref(),
            Some("http://other/db")
        );

        assert!(RemoteSettings::default().resolve_url("stories", None).is_none());
    }

    #[tokio::test]
    async fn test_no_url_does_nothing() {
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        let (controller, status) = controller(remote, RemoteSettings::default());
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());

        let lease = Generation::new().lease();
        assert!(!controller.start_live_sync(local, &lease, None).await);
        assert!(controller.remote().await.is_none());
        assert_eq!(status.current(), Default::default());
    }

    #[tokio::test]
    async fn test_live_sync_reaches_paused() {
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        remote.put(Document::with_type("story-1", "story")).unwrap();
        let (controller, status) = controller(remote, settings());
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());

        let lease = Generation::new().lease();
        assert!(controller.start_live_sync(local.clone(), &lease, None).await);
        assert!(controller.is_live().await);

        let mut rx = status.subscribe();
        let paused = rx
            .wait_for(|s| s.last_sync_at.is_some() && !s.is_syncing)
            .await
            .unwrap()
            .clone();
        assert!(!paused.is_connecting);
        assert!(paused.error.is_none());
        assert!(local.get("story-1").unwrap().is_some());

        controller.stop_live_sync().await;
        assert!(!controller.is_live().await);
        assert!(controller.remote().await.is_some());

        controller.reset().await;
        assert!(controller.remote().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_remote_publishes_error() {
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        remote.close().unwrap();
        let (controller, status) = controller(remote, settings());
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());

        let lease = Generation::new().lease();
        assert!(!controller.start_live_sync(local, &lease, None).await);

        let current = status.current();
        assert!(!current.is_connecting);
        assert!(current.error.is_some());
        assert!(controller.remote().await.is_none());
        assert!(!controller.is_live().await);
    }

    #[tokio::test]
    async fn test_stale_lease_is_ignored() {
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        let (controller, _status) = controller(remote, settings());
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());

        let generation = Generation::new();
        let lease = generation.lease();
        generation.advance();

        assert!(!controller.start_live_sync(local.clone(), &lease, None).await);
        assert!(!controller.connect(&local, &lease, None).await);
        assert!(controller.remote().await.is_none());
    }

    #[tokio::test]
    async fn test_restart_replaces_previous_session() {
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        let (controller, _status) = controller(remote, settings());
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());
        let lease = Generation::new().lease();

        let (first, second) = tokio::join!(
            controller.start_live_sync(local.clone(), &lease, None),
            controller.start_live_sync(local.clone(), &lease, None)
        );
        assert!(first && second);
        assert!(controller.is_live().await);

        controller.stop_live_sync().await;
        assert!(!controller.is_live().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_clears_after_quiet_period() {
        let status = StatusPublisher::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = tokio::spawn(forward_events(rx, status.clone()));

        let change = ReplicationEvent::Change(ChangeEvent {
            direction: Direction::Pull,
            docs_read: 3,
            docs_written: 3,
            last_doc: Some(DocumentSummary {
                id: "story-1".to_string(),
                doc_type: Some("story".to_string()),
                title: Some("Opening".to_string()),
            }),
            pending: Some(0),
        });

        tx.send(change.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let progress = status.current().sync_progress.unwrap();
        assert_eq!(progress.docs_processed, 3);
        assert_eq!(progress.operation, Direction::Pull);

        // Another batch postpones the clear
        tx.send(change).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(status.current().sync_progress.is_some());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(status.current().sync_progress.is_none());
        assert!(status.current().is_syncing);

        tx.send(ReplicationEvent::Paused).unwrap();
        drop(tx);
        listener.await.unwrap();
        let status = status.current();
        assert!(!status.is_syncing);
        assert!(status.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_error_event_sets_message() {
        let status = StatusPublisher::default();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ReplicationEvent::Active { pending: None }).unwrap();
        tx.send(ReplicationEvent::Error("Sync failed".to_string()))
            .unwrap();
        drop(tx);

        forward_events(rx, status.clone()).await;
        let status = status.current();
        assert!(!status.is_syncing);
        assert_eq!(status.error.as_deref(), Some("Sync failed"));
    }

    #[tokio::test]
    async fn test_paused_after_error_clears_message() {
        let status = StatusPublisher::default();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ReplicationEvent::Error("Sync failed".to_string()))
            .unwrap();
        tx.send(ReplicationEvent::Paused).unwrap();
        drop(tx);

        forward_events(rx, status.clone()).await;
        let status = status.current();
        assert!(status.error.is_none());
        assert!(status.last_sync_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_does_not_wait_for_slow_remote() {
        let connector = Arc::new(SlowConnector {
            entered: tokio::sync::Notify::new(),
        });
        let controller = Arc::new(ReplicationController::new(
            settings(),
            connector.clone(),
            StatusPublisher::default(),
        ));
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());
        let generation = Generation::new();
        let lease = generation.lease();

        let setup = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start_live_sync(local, &lease, None).await })
        };
        connector.entered.notified().await;

        generation.advance();
        tokio::time::timeout(Duration::from_secs(1), controller.reset())
            .await
            .expect("reset blocked on the slow remote");
        assert!(!controller.status.current().is_connecting);

        assert!(!setup.await.unwrap());
        assert!(!controller.is_live().await);
        // The superseded attempt leaves no error behind
        assert!(controller.status.current().error.is_none());
    }
}
