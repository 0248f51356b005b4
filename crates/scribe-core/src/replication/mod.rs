//! Replication between document stores
//!
//! - [`peer`] - the contract both ends of a replication implement
//! - [`one_shot`] - a single checkpointed pass in one direction
//! - [`live`] - continuous push and pull with retry

pub mod live;
pub mod one_shot;
pub mod peer;

pub use live::{ChangeEvent, LiveReplication, LiveReplicationConfig, ReplicationEvent};
pub use one_shot::{
    exclude_snapshots, replicate_once, replication_id, BatchInfo, DocFilter, ReplicationOptions,
    ReplicationSummary,
};
pub use peer::{ChangeRow, ChangesBatch, PeerInfo, ReplicationPeer, RevMap};
