//! One-way, checkpointed replication
//!
//! Reads the source changes feed in batches, asks the target which
//! revisions it is missing, and writes those with their original revisions.
//! The last processed sequence is stored on both peers; replication resumes
//! from it only when both agree, otherwise it starts over from the beginning.

use tracing::{debug, warn};

use super::peer::{ChangeRow, ReplicationPeer, RevMap};
use crate::error::SyncResult;
use crate::models::{Document, DocumentSummary};

/// Predicate deciding whether a document takes part in replication
pub type DocFilter = fn(&Document) -> bool;

/// Default filter: snapshot documents stay where they were written
pub fn exclude_snapshots(doc: &Document) -> bool {
    !doc.is_snapshot()
}

/// Options for a replication run
#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    pub batch_size: usize,
    pub filter: DocFilter,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            filter: exclude_snapshots,
        }
    }
}

/// Progress of a single batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchInfo {
    /// Changes read from the source in this batch
    pub docs_read: u64,
    /// Revisions the target did not have and stored
    pub docs_written: u64,
    /// Last document transferred in this batch
    pub last_doc: Option<DocumentSummary>,
    /// Changes still waiting on the source
    pub pending: Option<u64>,
}

/// Totals of a finished replication
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplicationSummary {
    pub docs_read: u64,
    pub docs_written: u64,
    pub last_seq: String,
}

/// Identifier under which checkpoints for `source -> target` are stored
pub fn replication_id(source: &dyn ReplicationPeer, target: &dyn ReplicationPeer) -> String {
    format!("replication-{}-to-{}", source.name(), target.name())
}

/// Replicate `source` into `target` until the source feed is exhausted
///
/// `on_batch` is called after every batch that read at least one change.
pub async fn replicate_once<F>(
    source: &dyn ReplicationPeer,
    target: &dyn ReplicationPeer,
    options: &ReplicationOptions,
    mut on_batch: F,
) -> SyncResult<ReplicationSummary>
where
    F: FnMut(&BatchInfo) + Send,
{
    let rep_id = replication_id(source, target);
    let batch_size = options.batch_size.max(1);

    let source_checkpoint = source.get_checkpoint(&rep_id).await?;
    let target_checkpoint = target.get_checkpoint(&rep_id).await?;
    let mut since = match (source_checkpoint, target_checkpoint) {
        (Some(a), Some(b)) if a == b => a,
        _ => "0".to_string(),
    };
    debug!("Replicating {} from seq {}", rep_id, since);

    let mut summary = ReplicationSummary {
        last_seq: since.clone(),
        ..Default::default()
    };

    loop {
        let batch = source.changes(&since, batch_size).await?;
        if batch.results.is_empty() {
            break;
        }

        let candidates: Vec<&ChangeRow> = batch
            .results
            .iter()
            .filter(|row| row.doc.as_ref().is_some_and(|doc| (options.filter)(doc)))
            .collect();

        let mut revs = RevMap::new();
        for row in &candidates {
            revs.entry(row.id.clone()).or_default().push(row.rev.clone());
        }

        let missing = if revs.is_empty() {
            RevMap::new()
        } else {
            target.revs_diff(&revs).await?
        };

        let to_write: Vec<Document> = candidates
            .iter()
            .filter(|row| {
                missing
                    .get(&row.id)
                    .is_some_and(|revs| revs.contains(&row.rev))
            })
            .filter_map(|row| row.doc.clone())
            .collect();

        let last_doc = to_write.last().map(Document::summary);
        let written = if to_write.is_empty() {
            0
        } else {
            target.bulk_docs(to_write).await? as u64
        };

        let info = BatchInfo {
            docs_read: batch.results.len() as u64,
            docs_written: written,
            last_doc,
            pending: batch.pending,
        };
        summary.docs_read += info.docs_read;
        summary.docs_written += info.docs_written;
        on_batch(&info);

        since = batch.last_seq.clone();
        target.put_checkpoint(&rep_id, &since).await?;
        if let Err(e) = source.put_checkpoint(&rep_id, &since).await {
            // Without a source checkpoint the next run starts over, which is safe
            warn!("Could not store checkpoint on {}: {}", source.name(), e);
        }

        if batch.results.len() < batch_size || batch.pending == Some(0) {
            break;
        }
    }

    summary.last_seq = since;
    Ok(summary)
}
