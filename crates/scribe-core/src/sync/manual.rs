//! Manual push and pull
//!
//! A one-shot replication in one direction, bounded by a timeout, with
//! progress published after every batch. Unlike live sync, failures are
//! returned to the caller as well as published.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::items_for_direction;
use super::log::{LogKind, LogStatus, SyncLog};
use super::status::{StatusPublisher, SyncProgress};
use crate::error::{SyncError, SyncResult};
use crate::models::{Direction, User};
use crate::replication::{replicate_once, BatchInfo, ReplicationOptions, ReplicationPeer};
use crate::storage::LocalStore;

/// Upper bound for a manual run
pub const MANUAL_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a successful manual run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualSyncResult {
    pub docs_processed: u64,
}

/// Runs manual replications, one at a time
pub struct ManualReplicationRunner {
    status: StatusPublisher,
    log: Arc<SyncLog>,
    options: ReplicationOptions,
    timeout: Duration,
    running: Mutex<()>,
}

impl ManualReplicationRunner {
    pub fn new(status: StatusPublisher, log: Arc<SyncLog>) -> Self {
        Self {
            status,
            log,
            options: ReplicationOptions::default(),
            timeout: MANUAL_SYNC_TIMEOUT,
            running: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: ReplicationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replicate once between `local` and `remote` in `direction`
    ///
    /// Fails with [`SyncError::RemoteUnavailable`] without a remote handle.
    /// Overlapping calls wait for each other.
    pub async fn run_once(
        &self,
        direction: Direction,
        local: Arc<LocalStore>,
        remote: Option<Arc<dyn ReplicationPeer>>,
        user: &User,
    ) -> SyncResult<ManualSyncResult> {
        let remote = remote.ok_or(SyncError::RemoteUnavailable)?;
        let _running = self.running.lock().await;

        let (kind, label) = match direction {
            Direction::Push => (LogKind::Upload, "push"),
            Direction::Pull => (LogKind::Download, "pull"),
        };
        let log_id = self
            .log
            .start(kind, &format!("Manual {} started", label), user.log_id());
        let started = Instant::now();

        self.status.update(|s| {
            s.is_syncing = true;
            s.sync_progress = Some(SyncProgress::new(direction));
        });

        let result = self.replicate(direction, &local, remote.as_ref()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(docs_processed) => {
                self.status.update(|s| {
                    s.last_sync_at = Some(Utc::now());
                    s.error = None;
                    s.sync_progress = None;
                });
                self.log.update(&log_id, |entry| {
                    entry.action = format!("Manual {} completed", label);
                    entry.item_count = Some(docs_processed);
                    entry.duration_ms = Some(duration_ms);
                });
                Ok(ManualSyncResult { docs_processed })
            }
            Err(e) => {
                let message = e.user_message();
                self.status.update(|s| s.error = Some(message.clone()));
                self.log.update(&log_id, |entry| {
                    entry.kind = LogKind::Error;
                    entry.status = LogStatus::Error;
                    entry.action = format!("Manual {} failed", label);
                    entry.duration_ms = Some(duration_ms);
                    entry.details = Some(message);
                });
                Err(e)
            }
        };

        self.status.update(|s| {
            s.is_syncing = false;
            s.sync_progress = None;
        });
        outcome
    }

    /// The timed replication itself; returns the item count for `direction`
    async fn replicate(
        &self,
        direction: Direction,
        local: &LocalStore,
        remote: &dyn ReplicationPeer,
    ) -> SyncResult<u64> {
        let (source, target): (&dyn ReplicationPeer, &dyn ReplicationPeer) = match direction {
            Direction::Push => (local, remote),
            Direction::Pull => (remote, local),
        };

        let status = &self.status;
        let mut processed = 0;
        let on_batch = |info: &BatchInfo| {
            processed += items_for_direction(direction, info.docs_read, info.docs_written);
            status.update(|s| {
                let progress = s
                    .sync_progress
                    .get_or_insert_with(|| SyncProgress::new(direction));
                progress.docs_processed = processed;
                progress.pending_docs = info.pending;
                progress.total_docs = info.pending.map(|pending| processed + pending);
                if info.last_doc.is_some() {
                    progress.current_document = info.last_doc.clone();
                }
            });
        };

        let summary = tokio::time::timeout(
            self.timeout,
            replicate_once(source, target, &self.options, on_batch),
        )
        .await
        .map_err(|_| SyncError::SyncTimeout(self.timeout.as_secs()))??;

        debug!(
            "Manual {} read {} and wrote {} documents",
            direction, summary.docs_read, summary.docs_written
        );
        Ok(items_for_direction(
            direction,
            summary.docs_read,
            summary.docs_written,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn runner() -> (ManualReplicationRunner, StatusPublisher, Arc<SyncLog>) {
        let status = StatusPublisher::default();
        let log = Arc::new(SyncLog::new());
        (
            ManualReplicationRunner::new(status.clone(), log.clone()),
            status,
            log,
        )
    }

    #[tokio::test]
    async fn test_requires_remote() {
        let (runner, status, log) = runner();
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());

        let err = runner
            .run_once(Direction::Push, local, None, &User::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable));
        assert!(!status.current().is_syncing);
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_push_counts_written_docs() {
        let (runner, status, log) = runner();
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        for i in 0..4 {
            local
                .put(Document::with_type(format!("story-{}", i), "story"))
                .unwrap();
        }

        let result = runner
            .run_once(Direction::Push, local, Some(remote.clone()), &User::new("alice"))
            .await
            .unwrap();
        assert_eq!(result.docs_processed, 4);
        assert_eq!(remote.doc_count().unwrap(), 4);

        let status = status.current();
        assert!(!status.is_syncing);
        assert!(status.sync_progress.is_none());
        assert!(status.last_sync_at.is_some());

        let entry = &log.entries()[0];
        assert_eq!(entry.action, "Manual push completed");
        assert_eq!(entry.item_count, Some(4));
        assert_eq!(entry.user_id, "alice");
    }

    #[tokio::test]
    async fn test_failure_is_published_and_returned() {
        let (runner, status, log) = runner();
        let local = Arc::new(LocalStore::open_in_memory("local").unwrap());
        let remote = Arc::new(LocalStore::open_in_memory("remote").unwrap());
        remote.close().unwrap();

        let result = runner
            .run_once(Direction::Pull, local, Some(remote), &User::anonymous())
            .await;
        assert!(result.is_err());

        let status = status.current();
        assert!(!status.is_syncing);
        assert!(status.error.is_some());

        let entry = &log.entries()[0];
        assert_eq!(entry.status, LogStatus::Error);
        assert_eq!(entry.kind, LogKind::Error);
        assert_eq!(entry.user_id, "anonymous");
    }
}
