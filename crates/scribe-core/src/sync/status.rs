//! Sync status publishing
//!
//! The status is a single snapshot held in a watch channel. Every component
//! changes it through [`StatusPublisher::update`], which merges in place and
//! notifies subscribers, so two writers can never lose each other's fields.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::{Direction, DocumentSummary};

/// Progress of the transfer currently in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub docs_processed: u64,
    pub total_docs: Option<u64>,
    pub operation: Direction,
    pub current_document: Option<DocumentSummary>,
    pub pending_docs: Option<u64>,
}

impl SyncProgress {
    pub fn new(operation: Direction) -> Self {
        Self {
            docs_processed: 0,
            total_docs: None,
            operation,
            current_document: None,
            pending_docs: None,
        }
    }
}

/// Snapshot of the sync state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub is_connecting: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub sync_progress: Option<SyncProgress>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            is_syncing: false,
            is_connecting: false,
            last_sync_at: None,
            error: None,
            sync_progress: None,
        }
    }
}

/// Shared publisher of [`SyncStatus`] snapshots
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: Arc<watch::Sender<SyncStatus>>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(SyncStatus::default())
    }
}

impl StatusPublisher {
    pub fn new(initial: SyncStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Merge a change into the current snapshot and publish it
    ///
    /// Subscribers are only woken when the snapshot actually changed.
    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.tx.send_if_modified(|status| {
            let before = status.clone();
            f(status);
            *status != before
        });
    }

    /// Current snapshot
    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status() {
        let status = SyncStatus::default();
        assert!(status.is_online);
        assert!(!status.is_syncing);
        assert!(status.sync_progress.is_none());
    }

    #[test]
    fn test_updates_merge() {
        let publisher = StatusPublisher::default();
        publisher.update(|s| s.is_connecting = true);
        publisher.update(|s| s.error = Some("boom".to_string()));

        let status = publisher.current();
        assert!(status.is_connecting);
        assert_eq!(status.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let publisher = StatusPublisher::default();
        let mut rx = publisher.subscribe();

        publisher.update(|s| s.is_online = true);
        assert!(!rx.has_changed().unwrap());

        publisher.update(|s| s.is_syncing = true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_syncing);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut status = SyncStatus::default();
        status.sync_progress = Some(SyncProgress::new(Direction::Pull));
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["isOnline"], true);
        assert_eq!(json["syncProgress"]["operation"], "pull");
        assert_eq!(json["syncProgress"]["docsProcessed"], 0);
    }
}
