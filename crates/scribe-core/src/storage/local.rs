//! Local document store
//!
//! A SQLite-backed document database, one file per store name. Documents are
//! stored as JSON bodies keyed by `_id` with their winning `_rev`. Every write
//! takes the next value of a store-wide sequence, which orders the changes
//! feed used by replication.
//!
//! A store can be closed while other tasks still hold an `Arc` to it; every
//! later call fails with [`StoreError::Closed`], so a superseded store never
//! receives late writes.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::watch;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::schema::{init_schema, needs_init};
use crate::error::SyncResult;
use crate::models::{Document, Revision};
use crate::replication::{ChangeRow, ChangesBatch, PeerInfo, ReplicationPeer, RevMap};

/// A local document database
pub struct LocalStore {
    name: String,
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
    seq_tx: watch::Sender<u64>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl LocalStore {
    /// Open or create the store `name` inside `dir`
    pub fn open(dir: &Path, name: &str) -> StoreResult<Self> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDirectory {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(format!("{}.db", name));
        let conn = Connection::open(&path)?;
        Self::from_connection(name, Some(path), conn)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(name: &str) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(name, None, conn)
    }

    fn from_connection(name: &str, path: Option<PathBuf>, conn: Connection) -> StoreResult<Self> {
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        let seq: i64 = conn.query_row("SELECT value FROM update_seq WHERE id = 0", [], |row| {
            row.get(0)
        })?;
        let (seq_tx, _) = watch::channel(seq as u64);

        debug!("Opened local store {}", name);
        Ok(Self {
            name: name.to_string(),
            path,
            conn: Mutex::new(Some(conn)),
            seq_tx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory holding the database file
    pub fn dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Close the underlying connection
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> StoreResult<()> {
        let conn = self.lock().take();
        match conn {
            Some(conn) => {
                debug!("Closing local store {}", self.name);
                conn.close().map_err(|(_, e)| StoreError::Database(e))
            }
            None => Ok(()),
        }
    }

    /// Watch the latest update sequence; changes on every write
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.seq_tx.subscribe()
    }

    pub fn update_seq(&self) -> u64 {
        *self.seq_tx.borrow()
    }

    // ==================== Document Operations ====================

    /// Write a document, creating a new revision
    ///
    /// Updating an existing document requires its current `_rev`.
    pub fn put(&self, mut doc: Document) -> StoreResult<String> {
        let id = doc.id().ok_or(StoreError::MissingId)?.to_string();

        let rev = self.with_tx(|tx| {
            let current: Option<(String, bool)> = tx
                .query_row(
                    "SELECT rev, deleted FROM docs WHERE id = ?",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let next = match (&current, doc.rev()) {
                (None, None) => Revision::first(),
                (Some((rev, deleted)), given)
                    if given == Some(rev.as_str()) || (*deleted && given.is_none()) =>
                {
                    Revision::parse(rev)
                        .map(|r| r.next())
                        .unwrap_or_else(Revision::first)
                }
                _ => return Err(StoreError::Conflict { id: id.clone() }),
            };

            doc.set_rev(next.to_string());
            write_doc(tx, &doc)?;
            Ok(next.to_string())
        })?;

        Ok(rev)
    }

    /// Get a live document by id
    pub fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        self.with_conn(|conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM docs WHERE id = ? AND deleted = 0",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            body.map(|b| parse_body(&b)).transpose()
        })
    }

    /// Delete a document by writing a tombstone revision
    pub fn delete(&self, id: &str, rev: &str) -> StoreResult<String> {
        let mut tombstone = Document::new(id);
        tombstone.set_rev(rev);
        tombstone.set("_deleted", serde_json::Value::Bool(true));
        self.put(tombstone)
    }

    /// All live documents ordered by id
    pub fn all_docs(&self) -> StoreResult<Vec<Document>> {
        self.query_docs("SELECT body FROM docs WHERE deleted = 0 ORDER BY id", [])
    }

    /// Live documents with the given `type`
    pub fn docs_by_type(&self, doc_type: &str) -> StoreResult<Vec<Document>> {
        self.query_docs(
            "SELECT body FROM docs WHERE deleted = 0 AND doc_type = ? ORDER BY id",
            [doc_type],
        )
    }

    /// Count of live documents
    pub fn doc_count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM docs WHERE deleted = 0", [], |row| {
                    row.get(0)
                })?;
            Ok(count as u64)
        })
    }

    /// Reclaim space left by superseded revisions
    pub fn compact(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
    }

    // ==================== Replication Support ====================

    /// Changes after sequence `since`, oldest first
    pub fn changes_since(&self, since: u64, limit: usize) -> StoreResult<ChangesBatch> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, rev, deleted, body FROM docs WHERE seq > ? ORDER BY seq LIMIT ?",
            )?;
            let rows = stmt.query_map(params![since as i64, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut results = Vec::new();
            let mut last_seq = since;
            for row in rows {
                let (seq, id, rev, deleted, body) = row?;
                last_seq = seq as u64;
                results.push(ChangeRow {
                    seq: seq.to_string(),
                    id,
                    rev,
                    deleted,
                    doc: Some(parse_body(&body)?),
                });
            }

            let pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM docs WHERE seq > ?",
                params![last_seq as i64],
                |row| row.get(0),
            )?;

            Ok(ChangesBatch {
                results,
                last_seq: last_seq.to_string(),
                pending: Some(pending as u64),
            })
        })
    }

    /// Revisions from `revs` this store has never seen
    pub fn missing_revs(&self, revs: &RevMap) -> StoreResult<RevMap> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM revs WHERE id = ? AND rev = ?")?;
            let mut missing = RevMap::new();
            for (id, candidates) in revs {
                for rev in candidates {
                    if !stmt.exists(params![id, rev])? {
                        missing.entry(id.clone()).or_default().push(rev.clone());
                    }
                }
            }
            Ok(missing)
        })
    }

    /// Store replicated documents, keeping their revisions
    ///
    /// The winning revision of each document is chosen deterministically,
    /// so both sides of a replication converge on the same winner.
    pub fn write_replicated(&self, docs: Vec<Document>) -> StoreResult<usize> {
        let written = self.with_tx(|tx| {
            let mut written = 0;
            for doc in &docs {
                let (Some(id), Some(rev)) = (doc.id(), doc.rev()) else {
                    return Err(StoreError::MissingId);
                };

                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO revs (id, rev) VALUES (?, ?)",
                    params![id, rev],
                )?;
                if inserted == 0 {
                    continue;
                }
                written += 1;

                let current: Option<String> = tx
                    .query_row("SELECT rev FROM docs WHERE id = ?", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?;

                let current = current.as_deref().and_then(Revision::parse);
                let wins = match (current, Revision::parse(rev)) {
                    (Some(current), Some(incoming)) => incoming.wins_over(&current),
                    (None, _) => true,
                    (Some(_), None) => false,
                };
                if wins {
                    write_doc(tx, doc)?;
                }
            }
            Ok(written)
        })?;

        Ok(written)
    }

    pub fn checkpoint(&self, replication_id: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT seq FROM checkpoints WHERE replication_id = ?",
                    params![replication_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn set_checkpoint(&self, replication_id: &str, seq: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (replication_id, seq) VALUES (?, ?)",
                params![replication_id, seq],
            )?;
            Ok(())
        })
    }

    // ==================== Internals ====================

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| StoreError::Closed(self.name.clone()))?;
        f(conn)
    }

    fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let (value, seq) = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            let seq: i64 =
                tx.query_row("SELECT value FROM update_seq WHERE id = 0", [], |row| {
                    row.get(0)
                })?;
            tx.commit()?;
            Ok((value, seq as u64))
        })?;

        self.seq_tx.send_if_modified(|current| {
            if *current == seq {
                return false;
            }
            *current = seq;
            true
        });
        Ok(value)
    }

    fn query_docs<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let bodies = stmt.query_map(params, |row| row.get::<_, String>(0))?;
            let mut docs = Vec::new();
            for body in bodies {
                docs.push(parse_body(&body?)?);
            }
            Ok(docs)
        })
    }
}

/// Insert or replace the winning revision of a document
fn write_doc(tx: &Transaction<'_>, doc: &Document) -> StoreResult<()> {
    let id = doc.id().ok_or(StoreError::MissingId)?;
    let rev = doc
        .rev()
        .ok_or_else(|| StoreError::Conflict { id: id.to_string() })?;

    tx.execute("UPDATE update_seq SET value = value + 1 WHERE id = 0", [])?;
    let seq: i64 = tx.query_row("SELECT value FROM update_seq WHERE id = 0", [], |row| {
        row.get(0)
    })?;

    let body = serde_json::to_string(doc.as_map())?;
    tx.execute(
        "INSERT OR IGNORE INTO revs (id, rev) VALUES (?, ?)",
        params![id, rev],
    )?;
    tx.execute(
        "INSERT INTO docs (id, rev, doc_type, deleted, body, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            rev = excluded.rev,
            doc_type = excluded.doc_type,
            deleted = excluded.deleted,
            body = excluded.body,
            seq = excluded.seq",
        params![id, rev, doc.doc_type(), doc.is_deleted(), body, seq],
    )?;
    Ok(())
}

fn parse_body(body: &str) -> StoreResult<Document> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    Document::from_value(value).ok_or(StoreError::MissingId)
}

#[async_trait]
impl ReplicationPeer for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn info(&self) -> SyncResult<PeerInfo> {
        Ok(PeerInfo {
            db_name: self.name.clone(),
            doc_count: self.doc_count()?,
            update_seq: self.update_seq().to_string(),
        })
    }

    async fn changes(&self, since: &str, limit: usize) -> SyncResult<ChangesBatch> {
        let since = since.parse().unwrap_or(0);
        Ok(self.changes_since(since, limit)?)
    }

    async fn revs_diff(&self, revs: &RevMap) -> SyncResult<RevMap> {
        Ok(self.missing_revs(revs)?)
    }

    async fn bulk_docs(&self, docs: Vec<Document>) -> SyncResult<usize> {
        Ok(self.write_replicated(docs)?)
    }

    async fn get_checkpoint(&self, replication_id: &str) -> SyncResult<Option<String>> {
        Ok(self.checkpoint(replication_id)?)
    }

    async fn put_checkpoint(&self, replication_id: &str, seq: &str) -> SyncResult<()> {
        Ok(self.set_checkpoint(replication_id, seq)?)
    }
}
