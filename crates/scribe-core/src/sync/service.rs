//! Sync service
//!
//! Owns the active local store and switches it whenever the user identity
//! changes. A switch stops live sync, closes the previous store and opens
//! the store named after the new user; index creation and sync setup for
//! the new store then run in the background, each guarded by a [`Lease`] so
//! they abandon their work if another switch happens first.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::controller::{RemoteSettings, ReplicationController};
use super::generation::{Generation, Lease};
use super::log::SyncLog;
use super::manual::{ManualReplicationRunner, ManualSyncResult};
use super::network::NetworkObserver;
use super::status::{StatusPublisher, SyncStatus};
use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::maintenance::{self, CleanupReport, StorageHealth};
use crate::models::{Direction, User};
use crate::remote::RemoteConnector;
use crate::storage::{store_name, LocalStore, Platform, DEFAULT_INDEX_FIELDS};

struct ActiveStore {
    store: Arc<LocalStore>,
    user: User,
}

/// Local-first sync for the current user
pub struct SyncService {
    config: Config,
    platform: Arc<dyn Platform>,
    status: StatusPublisher,
    log: Arc<SyncLog>,
    controller: ReplicationController,
    manual: ManualReplicationRunner,
    generation: Generation,
    active: Mutex<Option<ActiveStore>>,
    background: StdMutex<Vec<JoinHandle<()>>>,
    network: StdMutex<Option<NetworkObserver>>,
}

impl SyncService {
    pub fn new(
        config: Config,
        connector: Arc<dyn RemoteConnector>,
        platform: Arc<dyn Platform>,
    ) -> Arc<Self> {
        let log = match SyncLog::with_path(config.sync_log_path()) {
            Ok(log) => log,
            Err(e) => {
                warn!("Starting with an empty sync log: {:#}", e);
                SyncLog::new()
            }
        };
        Self::with_log(config, connector, platform, Arc::new(log))
    }

    /// Create a service writing to an existing log
    pub fn with_log(
        config: Config,
        connector: Arc<dyn RemoteConnector>,
        platform: Arc<dyn Platform>,
        log: Arc<SyncLog>,
    ) -> Arc<Self> {
        let status = StatusPublisher::default();
        let controller = ReplicationController::new(
            RemoteSettings::from_config(&config),
            connector,
            status.clone(),
        );
        let manual = ManualReplicationRunner::new(status.clone(), Arc::clone(&log));

        Arc::new(Self {
            config,
            platform,
            status,
            log,
            controller,
            manual,
            generation: Generation::new(),
            active: Mutex::new(None),
            background: StdMutex::new(Vec::new()),
            network: StdMutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status_publisher(&self) -> &StatusPublisher {
        &self.status
    }

    pub fn sync_log(&self) -> &Arc<SyncLog> {
        &self.log
    }

    pub fn controller(&self) -> &ReplicationController {
        &self.controller
    }

    /// Keep `is_online` in step with `online` until shutdown
    ///
    /// Replaces any previously observed signal.
    pub fn observe_network(&self, online: watch::Receiver<bool>) {
        let observer = NetworkObserver::spawn(online, self.status.clone());
        let mut network = self.network.lock().unwrap_or_else(|e| e.into_inner());
        *network = Some(observer);
    }

    /// The active local store
    pub async fn database(&self) -> SyncResult<Arc<LocalStore>> {
        self.active_store().await.map(|(store, _)| store)
    }

    pub async fn current_user(&self) -> Option<User> {
        self.active.lock().await.as_ref().map(|a| a.user.clone())
    }

    async fn active_store(&self) -> SyncResult<(Arc<LocalStore>, User)> {
        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(SyncError::NotInitialized)?;
        Ok((Arc::clone(&active.store), active.user.clone()))
    }

    /// Make the store of `user` the active one
    ///
    /// A no-op when that store is already open. Failing to open the new store
    /// leaves no store active.
    pub async fn switch_to_user(self: &Arc<Self>, user: User) -> SyncResult<()> {
        let name = store_name(&user);
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_mut() {
            if current.store.name() == name {
                current.user = user;
                return Ok(());
            }
        }

        self.generation.advance();
        self.controller.reset().await;

        if let Some(previous) = active.take() {
            debug!("Closing store {}", previous.store.name());
            if let Err(e) = previous.store.close() {
                warn!("Failed to close store {}: {}", previous.store.name(), e);
            }
        }

        let store = Arc::new(LocalStore::open(&self.config.data_dir, &name)?);
        info!("Opened store {} for {}", name, user.log_id());
        *active = Some(ActiveStore {
            store: Arc::clone(&store),
            user,
        });
        let lease = self.generation.lease();
        drop(active);

        self.spawn_index_creation(Arc::clone(&store), lease.clone());
        if self.config.sync_enabled {
            self.spawn_sync_setup(store, lease);
        }
        Ok(())
    }

    /// Switch stores on every identity emission, starting with the current one
    ///
    /// `None` maps to the anonymous user.
    pub fn follow_identity(
        self: &Arc<Self>,
        mut identity: watch::Receiver<Option<User>>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let user = identity
                    .borrow_and_update()
                    .clone()
                    .unwrap_or_else(User::anonymous);
                if let Err(e) = this.switch_to_user(user).await {
                    error!("Failed to open local store: {}", e);
                }
                if identity.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_index_creation(&self, store: Arc<LocalStore>, lease: Lease) {
        let handle = tokio::spawn(async move {
            for field in DEFAULT_INDEX_FIELDS {
                if !lease.is_current() {
                    debug!("Abandoning index creation for {}", store.name());
                    return;
                }
                match store.create_index(field) {
                    Ok(count) => {
                        debug!("Index {} on {} has {} entries", field, store.name(), count)
                    }
                    Err(e) => warn!("Failed to create index {} on {}: {}", field, store.name(), e),
                }
                tokio::task::yield_now().await;
            }
        });
        self.track(handle);
    }

    fn spawn_sync_setup(self: &Arc<Self>, store: Arc<LocalStore>, lease: Lease) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.controller.start_live_sync(store, &lease, None).await;
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Wait until background work started so far has finished
    pub async fn wait_for_background(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
                background.drain(..).collect()
            };
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                let _ = handle.await;
            }
        }
    }

    /// Establish the remote handle without starting live sync
    pub async fn connect_remote(&self, url_override: Option<&str>) -> SyncResult<bool> {
        let store = self.database().await?;
        let lease = self.generation.lease();
        Ok(self.controller.connect(&store, &lease, url_override).await)
    }

    /// Start live sync for the active store
    pub async fn start_live_sync(&self, url_override: Option<&str>) -> SyncResult<bool> {
        let store = self.database().await?;
        let lease = self.generation.lease();
        Ok(self
            .controller
            .start_live_sync(store, &lease, url_override)
            .await)
    }

    pub async fn stop_live_sync(&self) {
        self.controller.stop_live_sync().await;
    }

    /// Push local changes to the remote once
    pub async fn push(&self) -> SyncResult<ManualSyncResult> {
        self.run_manual(Direction::Push).await
    }

    /// Pull remote changes once
    pub async fn pull(&self) -> SyncResult<ManualSyncResult> {
        self.run_manual(Direction::Pull).await
    }

    async fn run_manual(&self, direction: Direction) -> SyncResult<ManualSyncResult> {
        let (store, user) = self.active_store().await?;
        let remote = self.controller.remote().await;
        self.manual.run_once(direction, store, remote, &user).await
    }

    pub async fn check_storage_health(&self) -> Option<StorageHealth> {
        maintenance::check_storage_health(self.platform.as_ref()).await
    }

    /// Remove index databases of stores other than the active and reserved ones
    pub async fn cleanup_stale_indexes(&self) -> Option<CleanupReport> {
        let active = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.store.name().to_string());
        maintenance::cleanup_stale_indexes(
            self.platform.as_ref(),
            active.as_deref(),
            &self.config.reserved_store,
        )
        .await
    }

    /// Stop sync, abandon background work and close the active store
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        self.generation.advance();
        self.controller.reset().await;

        if let Some(previous) = active.take() {
            if let Err(e) = previous.store.close() {
                warn!("Failed to close store {}: {}", previous.store.name(), e);
            }
        }
        drop(active);

        let pending: Vec<JoinHandle<()>> = {
            let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
            background.drain(..).collect()
        };
        for handle in pending {
            handle.abort();
        }
        self.network
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        info!("Sync service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::remote::HttpConnector;
    use crate::replication::ReplicationPeer;
    use crate::storage::FsPlatform;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            sync_enabled: false,
            ..Default::default()
        }
    }

    fn service(dir: &TempDir, config: Config) -> Arc<SyncService> {
        SyncService::new(
            config,
            Arc::new(HttpConnector),
            Arc::new(FsPlatform::new(dir.path(), None)),
        )
    }

    #[tokio::test]
    async fn test_database_before_switch() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));
        assert!(matches!(
            service.database().await,
            Err(SyncError::NotInitialized)
        ));
        assert!(matches!(service.push().await, Err(SyncError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_switch_opens_named_store() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));

        service.switch_to_user(User::new("Alice")).await.unwrap();
        let store = service.database().await.unwrap();
        assert_eq!(store.name(), "creative-writer-stories-alice");

        service.wait_for_background().await;
        assert!(dir
            .path()
            .join("creative-writer-stories-alice-mrview-type.db")
            .exists());
        assert!(dir
            .path()
            .join("creative-writer-stories-alice-mrview-storyId.db")
            .exists());
    }

    #[tokio::test]
    async fn test_switch_to_same_store_is_noop() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));

        service.switch_to_user(User::anonymous()).await.unwrap();
        let first = service.database().await.unwrap();
        service.switch_to_user(User::anonymous()).await.unwrap();
        let second = service.database().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.is_closed());
    }

    #[tokio::test]
    async fn test_switch_closes_previous_store() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));

        service.switch_to_user(User::new("alice")).await.unwrap();
        let alice = service.database().await.unwrap();
        service.switch_to_user(User::new("bob")).await.unwrap();

        assert!(alice.is_closed());
        assert_eq!(
            service.database().await.unwrap().name(),
            "creative-writer-stories-bob"
        );
        assert_eq!(service.current_user().await, Some(User::new("bob")));
    }

    #[tokio::test]
    async fn test_push_without_remote() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));
        service.switch_to_user(User::anonymous()).await.unwrap();

        assert!(matches!(
            service.push().await,
            Err(SyncError::RemoteUnavailable)
        ));
    }

    /// Connector whose remote is a shared in-process store
    struct LocalConnector(Arc<LocalStore>);

    #[async_trait]
    impl RemoteConnector for LocalConnector {
        async fn connect(
            &self,
            _url: &str,
            _credentials: Option<&Credentials>,
        ) -> SyncResult<Arc<dyn ReplicationPeer>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_connect_then_push() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        let mut config = config(&dir);
        config.remote_url = Some("http://localhost:5984/stories".to_string());
        let service = SyncService::new(
            config,
            Arc::new(LocalConnector(remote.clone())),
            Arc::new(FsPlatform::new(dir.path(), None)),
        );

        service.switch_to_user(User::new("alice")).await.unwrap();
        let store = service.database().await.unwrap();
        store
            .put(crate::models::Document::with_type("story-1", "story"))
            .unwrap();

        assert!(service.connect_remote(None).await.unwrap());
        let result = service.push().await.unwrap();
        assert_eq!(result.docs_processed, 1);
        assert!(remote.get("story-1").unwrap().is_some());
        assert_eq!(service.sync_log().entries()[0].action, "Manual push completed");
    }

    #[tokio::test]
    async fn test_shutdown_closes_store() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));
        service.switch_to_user(User::anonymous()).await.unwrap();
        let store = service.database().await.unwrap();

        service.shutdown().await;
        assert!(store.is_closed());
        assert!(matches!(
            service.database().await,
            Err(SyncError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_network_signal_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, config(&dir));
        let (online_tx, online_rx) = watch::channel(false);
        service.observe_network(online_rx);

        let mut status = service.subscribe_status();
        status.wait_for(|s| !s.is_online).await.unwrap();
        online_tx.send(true).unwrap();
        status.wait_for(|s| s.is_online).await.unwrap();

        service.shutdown().await;
        tokio::task::yield_now().await;
        let _ = online_tx.send(false);
        tokio::task::yield_now().await;
        assert!(service.status().is_online);
    }
}
