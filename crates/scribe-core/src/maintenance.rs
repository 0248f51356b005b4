//! Maintenance jobs
//!
//! Advisory housekeeping run on demand: a storage quota health check and the
//! removal of index databases left behind by stores that are no longer
//! active. Both degrade to `None` when the platform lacks the capability,
//! and neither ever fails as a whole.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::naming::parse_index_db_name;
use crate::storage::{Platform, StorageEstimate};

/// Usage at which storage is reported as high
pub const HIGH_USAGE_PERCENT: f64 = 75.0;

/// Usage above which storage is reported as critical
pub const CRITICAL_USAGE_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    High,
    Critical,
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "healthy"),
            HealthLevel::High => write!(f, "high"),
            HealthLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Result of a storage health check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    pub level: HealthLevel,
    pub percent_used: f64,
    pub usage: u64,
    pub quota: u64,
    /// Present for high and critical usage
    pub message: Option<String>,
}

/// Classify a storage estimate
pub fn assess(estimate: StorageEstimate) -> StorageHealth {
    let percent_used = if estimate.quota == 0 {
        0.0
    } else {
        estimate.usage as f64 / estimate.quota as f64 * 100.0
    };

    let (level, message) = if percent_used > CRITICAL_USAGE_PERCENT {
        (
            HealthLevel::Critical,
            Some(format!(
                "Storage is almost full ({:.0}% used). Sync may fail until space is freed.",
                percent_used
            )),
        )
    } else if percent_used >= HIGH_USAGE_PERCENT {
        (
            HealthLevel::High,
            Some(format!(
                "Storage is {:.0}% full. Consider removing old stories or snapshots.",
                percent_used
            )),
        )
    } else {
        (HealthLevel::Healthy, None)
    };

    StorageHealth {
        level,
        percent_used,
        usage: estimate.usage,
        quota: estimate.quota,
        message,
    }
}

/// Check storage usage; `None` when the platform cannot estimate it
pub async fn check_storage_health(platform: &dyn Platform) -> Option<StorageHealth> {
    let estimate = platform.storage_estimate().await?;
    let health = assess(estimate);
    match health.level {
        HealthLevel::Healthy => debug!("Storage {:.1}% used", health.percent_used),
        _ => warn!("Storage {:.1}% used ({})", health.percent_used, health.level),
    }
    Some(health)
}

/// Result of a cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub cleaned: usize,
    pub kept: usize,
    pub errors: Vec<String>,
}

/// Delete index databases of inactive stores
///
/// Indexes of `active_store` and `reserved_store` are kept, as is every
/// database that is not an index. Deletion failures are collected and the
/// job carries on. Returns `None` when databases cannot be enumerated.
pub async fn cleanup_stale_indexes(
    platform: &dyn Platform,
    active_store: Option<&str>,
    reserved_store: &str,
) -> Option<CleanupReport> {
    let Some(names) = platform.list_databases().await else {
        debug!("Database enumeration unsupported, skipping index cleanup");
        return None;
    };

    let mut report = CleanupReport::default();
    for name in names {
        let stale = match parse_index_db_name(&name) {
            Some((store, _)) => Some(store) != active_store && store != reserved_store,
            None => false,
        };
        if !stale {
            report.kept += 1;
            continue;
        }

        match platform.destroy_database(&name).await {
            Ok(()) => {
                debug!("Removed stale index {}", name);
                report.cleaned += 1;
            }
            Err(e) => {
                warn!("Failed to remove stale index {}: {}", name, e);
                report.errors.push(format!("{}: {}", name, e));
            }
        }
    }

    info!(
        "Index cleanup: {} removed, {} kept, {} errors",
        report.cleaned,
        report.kept,
        report.errors.len()
    );
    Some(report)
}
