//! Sync orchestration
//!
//! [`SyncService`] owns the active local store and ties together the
//! [`ReplicationController`] (remote handle and live sync), the
//! [`ManualReplicationRunner`] (push/pull), the [`StatusPublisher`] and the
//! [`SyncLog`].

pub mod controller;
pub mod generation;
pub mod log;
pub mod manual;
pub mod network;
pub mod service;
pub mod status;

pub use controller::{RemoteSettings, ReplicationController, PROGRESS_CLEAR_DELAY};
pub use generation::{Generation, Lease};
pub use log::{LogKind, LogStatus, SyncLog, SyncLogEntry, MAX_ENTRIES};
pub use manual::{ManualReplicationRunner, ManualSyncResult, MANUAL_SYNC_TIMEOUT};
pub use network::NetworkObserver;
pub use service::SyncService;
pub use status::{StatusPublisher, SyncProgress, SyncStatus};

use crate::models::Direction;

/// Documents counted for a batch: pushes count writes, pulls count reads
pub fn items_for_direction(direction: Direction, docs_read: u64, docs_written: u64) -> u64 {
    match direction {
        Direction::Push => docs_written,
        Direction::Pull => docs_read,
    }
}
