//! Scribe Core Library
//!
//! This crate provides the local-first sync core for Scribe, a creative
//! writing application: a document store per user, live bidirectional
//! replication with a remote document server, manual push/pull, and the
//! sync status shown to the user.
//!
//! # Architecture
//!
//! - **Local store**: SQLite-backed document database, one per user
//! - **Remote store**: CouchDB-compatible server reached over HTTP
//! - **Replication**: checkpointed changes-feed replication in both directions
//!
//! Snapshot documents (`story-snapshot`) never take part in replication.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let platform = Arc::new(FsPlatform::new(&config.data_dir, config.storage_quota_bytes));
//! let service = SyncService::new(config, Arc::new(HttpConnector), platform);
//!
//! service.switch_to_user(User::new("alice")).await?;
//! let mut status = service.subscribe_status();
//! let pushed = service.push().await?;
//! ```
//!
//! # Modules
//!
//! - `sync`: Sync service, replication controller, manual runs and status
//! - `replication`: One-shot and live replication between peers
//! - `remote`: HTTP remote store and remote URL resolution
//! - `storage`: Local stores, secondary indexes and platform primitives
//! - `maintenance`: Storage health check and stale index cleanup
//! - `models`: Documents, users and revisions
//! - `config`: Application configuration

pub mod config;
pub mod error;
pub mod maintenance;
pub mod models;
pub mod remote;
pub mod replication;
pub mod storage;
pub mod sync;

pub use config::{Config, Credentials};
pub use error::{SyncError, SyncResult};
pub use maintenance::{CleanupReport, HealthLevel, StorageHealth};
pub use models::{Direction, Document, DocumentSummary, User, SNAPSHOT_DOC_TYPE};
pub use remote::{HttpConnector, HttpRemote, RemoteConnector, UrlMode};
pub use replication::ReplicationPeer;
pub use storage::{FsPlatform, LocalStore, Platform, StoreError, StoreResult};
pub use sync::{
    ManualSyncResult, NetworkObserver, StatusPublisher, SyncLog, SyncProgress, SyncService,
    SyncStatus,
};
