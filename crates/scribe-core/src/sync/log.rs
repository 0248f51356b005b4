//! Sync activity log
//!
//! A short history of sync operations for display to the user. Each operation
//! writes a "started" entry and later updates it in place with its outcome.
//! Entries are kept newest first, capped at [`MAX_ENTRIES`], and persisted as
//! JSON next to the local stores.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Entries kept in the log
pub const MAX_ENTRIES: usize = 50;

/// Kind of activity recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Upload,
    Download,
    Error,
}

/// Outcome of a logged operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

/// One log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub status: LogStatus,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Capped, optionally persistent activity log
#[derive(Debug, Default)]
pub struct SyncLog {
    entries: Mutex<VecDeque<SyncLogEntry>>,
    path: Option<PathBuf>,
}

impl SyncLog {
    /// Create an in-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log persisted at `path`, loading existing entries
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let json = fs::read_to_string(&path).context("Failed to read sync log")?;
            let mut entries: VecDeque<SyncLogEntry> =
                serde_json::from_str(&json).context("Failed to parse sync log")?;
            entries.truncate(MAX_ENTRIES);
            entries
        } else {
            VecDeque::new()
        };

        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    /// Record the start of an operation; returns the entry id
    pub fn start(&self, kind: LogKind, action: &str, user_id: &str) -> String {
        let entry = SyncLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: LogStatus::Success,
            action: action.to_string(),
            item_count: None,
            duration_ms: None,
            details: None,
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        };
        info!(user = user_id, "{}", action);

        let id = entry.id.clone();
        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(MAX_ENTRIES);
        self.persist(&entries);
        id
    }

    /// Update the entry `id` in place; returns false when it is gone
    pub fn update(&self, id: &str, f: impl FnOnce(&mut SyncLogEntry)) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        f(entry);

        match entry.status {
            LogStatus::Success => info!(
                user = %entry.user_id,
                items = ?entry.item_count,
                duration_ms = ?entry.duration_ms,
                "{}",
                entry.action
            ),
            LogStatus::Error => warn!(
                user = %entry.user_id,
                details = ?entry.details,
                "{}",
                entry.action
            ),
        }

        self.persist(&entries);
        true
    }

    /// Entries, newest first
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries);
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SyncLogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persistence is best effort; the in-memory log stays authoritative
    fn persist(&self, entries: &VecDeque<SyncLogEntry>) {
        if let Err(e) = self.save(entries) {
            warn!("Failed to save sync log: {:#}", e);
        }
    }

    fn save(&self, entries: &VecDeque<SyncLogEntry>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json).context("Failed to write sync log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_start_and_update() {
        let log = SyncLog::new();
        let id = log.start(LogKind::Upload, "Manual push started", "alice");

        assert!(log.update(&id, |e| {
            e.action = "Manual push completed".to_string();
            e.item_count = Some(4);
            e.duration_ms = Some(120);
        }));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "Manual push completed");
        assert_eq!(entries[0].item_count, Some(4));
        assert_eq!(entries[0].user_id, "alice");
    }

    #[test]
    fn test_update_unknown_id() {
        let log = SyncLog::new();
        assert!(!log.update("missing", |e| e.status = LogStatus::Error));
    }

    #[test]
    fn test_capped_newest_first() {
        let log = SyncLog::new();
        for i in 0..(MAX_ENTRIES + 5) {
            log.start(LogKind::Info, &format!("entry {}", i), "anonymous");
        }

        let entries = log.entries();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].action, format!("entry {}", MAX_ENTRIES + 4));
    }

    #[test]
    fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync_log.json");

        {
            let log = SyncLog::with_path(path.clone()).unwrap();
            let id = log.start(LogKind::Download, "Manual pull started", "bob");
            log.update(&id, |e| {
                e.status = LogStatus::Error;
                e.kind = LogKind::Error;
                e.details = Some("Connection timed out".to_string());
            });
        }

        let log = SyncLog::with_path(path).unwrap();
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LogStatus::Error);
        assert_eq!(entries[0].details.as_deref(), Some("Connection timed out"));
    }

    #[test]
    fn test_entry_json_shape() {
        let log = SyncLog::new();
        log.start(LogKind::Upload, "Manual push started", "alice");
        let json = serde_json::to_value(&log.entries()[0]).unwrap();

        assert_eq!(json["type"], "upload");
        assert_eq!(json["status"], "success");
        assert_eq!(json["userId"], "alice");
        assert!(json.get("itemCount").is_none());
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let log = SyncLog::with_path(temp_dir.path().join("sync_log.json")).unwrap();
        log.start(LogKind::Info, "hello", "anonymous");
        log.clear();
        assert!(log.entries().is_empty());
    }
}
