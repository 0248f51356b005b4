//! Secondary indexes
//!
//! An index over one document field lives in its own database next to the
//! primary store (`{store}-mrview-{field}.db`). It holds `(key, doc_id)` rows
//! and is rebuilt from the primary store on creation, so deleting an index
//! database never loses data.

use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use super::error::StoreResult;
use super::local::LocalStore;
use super::naming::index_db_name;
use super::schema::init_index_schema;

/// Fields indexed for every store
pub const DEFAULT_INDEX_FIELDS: &[&str] = &["type", "storyId"];

/// A materialized `(key, doc_id)` view over one field
pub struct SecondaryIndex {
    name: String,
    field: String,
    conn: Connection,
}

impl SecondaryIndex {
    /// Open (creating if needed) the index on `field` for `store`
    ///
    /// In-memory stores get in-memory indexes.
    pub fn open(store: &LocalStore, field: &str) -> StoreResult<Self> {
        let name = index_db_name(store.name(), field);
        let conn = match store.dir() {
            Some(dir) => Connection::open(dir.join(format!("{}.db", name)))?,
            None => Connection::open_in_memory()?,
        };
        init_index_schema(&conn)?;

        Ok(Self {
            name,
            field: field.to_string(),
            conn,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Rebuild every entry from the primary store; returns the entry count
    pub fn rebuild(&mut self, store: &LocalStore) -> StoreResult<usize> {
        let docs = store.all_docs()?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM entries", [])?;
        let mut count = 0;
        for doc in &docs {
            let (Some(id), Some(value)) = (doc.id(), doc.get(&self.field)) else {
                continue;
            };
            tx.execute(
                "INSERT OR IGNORE INTO entries (key, doc_id) VALUES (?, ?)",
                params![index_key(value), id],
            )?;
            count += 1;
        }
        tx.execute(
            "INSERT OR REPLACE INTO index_info (key, value) VALUES ('update_seq', ?)",
            [store.update_seq().to_string()],
        )?;
        tx.commit()?;

        debug!("Rebuilt index {} with {} entries", self.name, count);
        Ok(count)
    }

    /// Document ids whose field equals `key`
    pub fn lookup(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc_id FROM entries WHERE key = ? ORDER BY doc_id")?;
        let ids = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

impl LocalStore {
    /// Create (or refresh) the index on `field`; returns the entry count
    pub fn create_index(&self, field: &str) -> StoreResult<usize> {
        let mut index = SecondaryIndex::open(self, field)?;
        index.rebuild(self)
    }
}

/// Strings index as themselves, everything else as JSON text
fn index_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use serde_json::json;
    use tempfile::TempDir;

    fn scene_index_doc(id: &str, story_id: &str) -> Document {
        let mut doc = Document::with_type(id, "codex");
        doc.set("storyId", json!(story_id));
        doc
    }

    #[test]
    fn test_index_lookup() {
        let store = LocalStore::open_in_memory("test").unwrap();
        store.put(scene_index_doc("codex-1", "story-a")).unwrap();
        store.put(scene_index_doc("codex-2", "story-b")).unwrap();
        store.put(Document::with_type("story-a", "story")).unwrap();

        let mut index = SecondaryIndex::open(&store, "storyId").unwrap();
        assert_eq!(index.rebuild(&store).unwrap(), 2);
        assert_eq!(index.lookup("story-a").unwrap(), vec!["codex-1".to_string()]);
        assert!(index.lookup("story-c").unwrap().is_empty());
    }

    #[test]
    fn test_type_index_counts_all_typed_docs() {
        let store = LocalStore::open_in_memory("test").unwrap();
        store.put(scene_index_doc("codex-1", "story-a")).unwrap();
        store.put(Document::with_type("story-a", "story")).unwrap();
        store.put(Document::new("untyped")).unwrap();

        assert_eq!(store.create_index("type").unwrap(), 2);
    }

    #[test]
    fn test_index_database_lives_next_to_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(temp_dir.path(), "creative-writer-stories-alice").unwrap();

        store.create_index("type").unwrap();
        assert!(temp_dir
            .path()
            .join("creative-writer-stories-alice-mrview-type.db")
            .exists());
    }

    #[test]
    fn test_index_key_for_non_strings() {
        assert_eq!(index_key(&json!("story")), "story");
        assert_eq!(index_key(&json!(3)), "3");
        assert_eq!(index_key(&json!(true)), "true");
    }
}
