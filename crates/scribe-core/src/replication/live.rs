//! Live bidirectional replication
//!
//! A spawned task repeatedly pushes local changes to the remote and pulls
//! remote changes into the local store. Between rounds it waits for either a
//! local write or the poll interval. Failures are reported as events and
//! retried forever with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::one_shot::{replicate_once, BatchInfo, ReplicationOptions};
use super::peer::ReplicationPeer;
use crate::error::SyncResult;
use crate::models::{Direction, DocumentSummary};
use crate::storage::LocalStore;

/// Commands sent to the replication task
#[derive(Debug, Clone)]
pub enum LiveCommand {
    /// Run a round now instead of waiting for the poll interval
    SyncNow,
    /// Shutdown the replication task
    Shutdown,
}

/// A batch of documents that moved in one direction
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub direction: Direction,
    pub docs_read: u64,
    pub docs_written: u64,
    pub last_doc: Option<DocumentSummary>,
    pub pending: Option<u64>,
}

/// Events emitted by the replication task
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// Documents started moving
    Active { pending: Option<u64> },
    /// A batch was transferred
    Change(ChangeEvent),
    /// Both sides are caught up
    Paused,
    /// A round failed; it will be retried
    Error(String),
}

/// Configuration for live replication
#[derive(Debug, Clone)]
pub struct LiveReplicationConfig {
    pub poll_interval: Duration,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub options: ReplicationOptions,
}

impl Default for LiveReplicationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            options: ReplicationOptions::default(),
        }
    }
}

/// Handle to a running live replication
pub struct LiveReplication {
    command_tx: mpsc::Sender<LiveCommand>,
    event_rx: Option<mpsc::UnboundedReceiver<ReplicationEvent>>,
    task: JoinHandle<()>,
}

impl LiveReplication {
    /// Spawn live replication between `local` and `remote`
    pub fn spawn(
        local: Arc<LocalStore>,
        remote: Arc<dyn ReplicationPeer>,
        config: LiveReplicationConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(replication_loop(local, remote, config, command_rx, event_tx));

        Self {
            command_tx,
            event_rx: Some(event_rx),
            task,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ReplicationEvent>> {
        self.event_rx.take()
    }

    /// Ask for an immediate round
    pub async fn sync_now(&self) {
        let _ = self.command_tx.send(LiveCommand::SyncNow).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop replication and wait for the task to exit
    pub async fn cancel(self) {
        if self.command_tx.send(LiveCommand::Shutdown).await.is_err() {
            self.task.abort();
        }
        let _ = self.task.await;
    }
}

/// Main replication loop with retry
async fn replication_loop(
    local: Arc<LocalStore>,
    remote: Arc<dyn ReplicationPeer>,
    config: LiveReplicationConfig,
    mut command_rx: mpsc::Receiver<LiveCommand>,
    event_tx: mpsc::UnboundedSender<ReplicationEvent>,
) {
    let mut local_changes = local.subscribe_changes();
    let mut retry_delay = config.initial_retry_delay;
    // Report the first catch-up and the first good round after a failure
    let mut announce_pause = true;

    loop {
        let round = sync_round(&local, remote.as_ref(), &config.options, &event_tx);

        let wait = tokio::select! {
            result = round => match result {
                Ok(transferred) => {
                    retry_delay = config.initial_retry_delay;
                    if transferred || announce_pause {
                        let _ = event_tx.send(ReplicationEvent::Paused);
                    }
                    announce_pause = false;
                    config.poll_interval
                }
                Err(e) => {
                    warn!("Live sync round failed: {}", e);
                    let _ = event_tx.send(ReplicationEvent::Error(e.user_message()));
                    announce_pause = true;
                    let wait = retry_delay;
                    retry_delay = (retry_delay * 2).min(config.max_retry_delay);
                    wait
                }
            },
            cmd = command_rx.recv() => match cmd {
                Some(LiveCommand::SyncNow) => Duration::ZERO,
                Some(LiveCommand::Shutdown) | None => break,
            },
        };

        // Mark everything written so far as seen
        local_changes.borrow_and_update();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            Ok(()) = local_changes.changed() => {
                debug!("Local change detected in {}", local.name());
            }
            cmd = command_rx.recv() => match cmd {
                Some(LiveCommand::SyncNow) => {}
                Some(LiveCommand::Shutdown) | None => break,
            },
        }
    }

    debug!("Live sync for {} stopped", local.name());
}

/// Push then pull; returns whether any document was written
async fn sync_round(
    local: &LocalStore,
    remote: &dyn ReplicationPeer,
    options: &ReplicationOptions,
    event_tx: &mpsc::UnboundedSender<ReplicationEvent>,
) -> SyncResult<bool> {
    let mut active = false;

    for direction in [Direction::Push, Direction::Pull] {
        let (source, target): (&dyn ReplicationPeer, &dyn ReplicationPeer) = match direction {
            Direction::Push => (local, remote),
            Direction::Pull => (remote, local),
        };

        replicate_once(source, target, options, |info: &BatchInfo| {
            if info.docs_written == 0 {
                return;
            }
            if !active {
                active = true;
                let _ = event_tx.send(ReplicationEvent::Active {
                    pending: info.pending,
                });
            }
            let _ = event_tx.send(ReplicationEvent::Change(ChangeEvent {
                direction,
                docs_read: info.docs_read,
                docs_written: info.docs_written,
                last_doc: info.last_doc.clone(),
                pending: info.pending,
            }));
        })
        .await?;
    }

    Ok(active)
}
