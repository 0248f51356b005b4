//! Replication peer contract
//!
//! Both ends of a replication speak the same small subset of the document
//! database replication protocol: a changes feed, revision negotiation,
//! bulk writes that keep the source revision, and checkpoint documents.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::models::Document;

/// Metadata returned by the reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub db_name: String,
    pub doc_count: u64,
    pub update_seq: String,
}

/// One entry of a changes feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRow {
    pub seq: String,
    pub id: String,
    pub rev: String,
    pub deleted: bool,
    pub doc: Option<Document>,
}

/// A page of the changes feed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangesBatch {
    pub results: Vec<ChangeRow>,
    pub last_seq: String,
    /// Changes remaining after this page, when the peer reports it
    pub pending: Option<u64>,
}

/// Document id to list of revisions
pub type RevMap = BTreeMap<String, Vec<String>>;

/// A document store that can take part in replication
#[async_trait]
pub trait ReplicationPeer: Send + Sync {
    /// Human-readable name, used in replication ids and logs
    fn name(&self) -> &str;

    /// Lightweight reachability probe
    async fn info(&self) -> SyncResult<PeerInfo>;

    /// Changes after `since` (exclusive), including document bodies
    async fn changes(&self, since: &str, limit: usize) -> SyncResult<ChangesBatch>;

    /// The subset of `revs` this peer does not have
    async fn revs_diff(&self, revs: &RevMap) -> SyncResult<RevMap>;

    /// Store documents with their existing revisions; returns how many were written
    async fn bulk_docs(&self, docs: Vec<Document>) -> SyncResult<usize>;

    /// Last sequence recorded for a replication
    async fn get_checkpoint(&self, replication_id: &str) -> SyncResult<Option<String>>;

    async fn put_checkpoint(&self, replication_id: &str, seq: &str) -> SyncResult<()>;
}
