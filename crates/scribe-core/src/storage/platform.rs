//! Platform capabilities
//!
//! Database enumeration, destruction and storage estimates are injected as a
//! [`Platform`] so maintenance jobs can run against the filesystem, a test
//! double, or nothing at all. Every capability may be missing; callers treat
//! `None` as "not supported" and skip the work.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use super::error::{StoreError, StoreResult};

/// Storage usage as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

/// Local database primitives the sync core depends on
#[async_trait]
pub trait Platform: Send + Sync {
    /// Names of every local database, `None` when enumeration is unsupported
    async fn list_databases(&self) -> Option<Vec<String>>;

    /// Permanently remove a database
    async fn destroy_database(&self, name: &str) -> StoreResult<()>;

    /// Storage usage and quota, `None` when unavailable
    async fn storage_estimate(&self) -> Option<StorageEstimate>;
}

/// Platform backed by the `*.db` files of a data directory
#[derive(Debug, Clone)]
pub struct FsPlatform {
    dir: PathBuf,
    quota: Option<u64>,
}

/// Files SQLite may keep next to a database
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

impl FsPlatform {
    pub fn new(dir: impl Into<PathBuf>, quota: Option<u64>) -> Self {
        Self {
            dir: dir.into(),
            quota,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn db_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.db", name))
    }
}

#[async_trait]
impl Platform for FsPlatform {
    async fn list_databases(&self) -> Option<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Some(Vec::new()),
            Err(e) => {
                warn!("Cannot enumerate databases in {:?}: {}", self.dir, e);
                return None;
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".db")) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Some(names)
    }

    async fn destroy_database(&self, name: &str) -> StoreResult<()> {
        let path = self.db_path(name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::from_io(e, path.clone()))?;

        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            // Sidecars are optional
            let _ = tokio::fs::remove_file(PathBuf::from(sidecar)).await;
        }
        Ok(())
    }

    async fn storage_estimate(&self) -> Option<StorageEstimate> {
        let quota = self.quota?;

        let mut usage = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    usage += meta.len();
                }
            }
        }

        Some(StorageEstimate { usage, quota })
    }
}
