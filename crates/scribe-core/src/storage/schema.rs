//! SQLite schema for local document stores
//!
//! Primary stores keep documents, their known revisions and replication
//! checkpoints. Index databases keep `(key, doc_id)` rows derived from a
//! primary store and can be rebuilt at any time.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the primary store schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Winning revision of every document; seq orders the changes feed
        CREATE TABLE IF NOT EXISTS docs (
            id TEXT PRIMARY KEY,
            rev TEXT NOT NULL,
            doc_type TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            body TEXT NOT NULL,
            seq INTEGER NOT NULL
        );

        -- Every revision this store has seen (answers revs_diff)
        CREATE TABLE IF NOT EXISTS revs (
            id TEXT NOT NULL,
            rev TEXT NOT NULL,
            PRIMARY KEY (id, rev)
        );

        -- Last replicated sequence per replication
        CREATE TABLE IF NOT EXISTS checkpoints (
            replication_id TEXT PRIMARY KEY,
            seq TEXT NOT NULL
        );

        -- Sequence counter
        CREATE TABLE IF NOT EXISTS update_seq (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            value INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO update_seq (id, value) VALUES (0, 0);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_docs_seq ON docs(seq);
        CREATE INDEX IF NOT EXISTS idx_docs_type ON docs(doc_type);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Initialize a secondary index database
pub fn init_index_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS index_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            key TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            PRIMARY KEY (key, doc_id)
        );

        CREATE INDEX IF NOT EXISTS idx_entries_doc_id ON entries(doc_id);
        "#,
    )
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.contains(&"docs".to_string()));
        assert!(tables.contains(&"revs".to_string()));
        assert!(tables.contains(&"checkpoints".to_string()));
        assert!(tables.contains(&"update_seq".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let seq: i64 = conn
            .query_row("SELECT value FROM update_seq WHERE id = 0", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(seq, 0);
    }

    #[test]
    fn test_index_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_index_schema(&conn).unwrap();
        assert!(table_names(&conn).contains(&"entries".to_string()));
    }
}
