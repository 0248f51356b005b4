//! Health, cleanup and sync log command handlers

use std::sync::Arc;

use anyhow::Result;

use scribe_core::{HealthLevel, SyncService};

use crate::output::{Output, OutputFormat};

/// Report storage usage against the quota
pub async fn health(service: &Arc<SyncService>, output: &Output) -> Result<()> {
    let Some(health) = service.check_storage_health().await else {
        match output.format {
            OutputFormat::Json => output.json(&serde_json::json!({"level": null})),
            _ => output.message("Storage estimate unavailable (no quota configured)."),
        }
        return Ok(());
    };

    match output.format {
        OutputFormat::Json => output.json(&health),
        OutputFormat::Quiet => println!("{}", health.level),
        OutputFormat::Human => {
            let marker = match health.level {
                HealthLevel::Healthy => "✓",
                HealthLevel::High | HealthLevel::Critical => "⚠",
            };
            println!(
                "{} Storage {}: {:.1}% used ({} of {} bytes)",
                marker, health.level, health.percent_used, health.usage, health.quota
            );
            if let Some(ref message) = health.message {
                println!("  {}", message);
            }
        }
    }
    Ok(())
}

/// Delete index databases of inactive stores
pub async fn cleanup(service: &Arc<SyncService>, output: &Output) -> Result<()> {
    let Some(report) = service.cleanup_stale_indexes().await else {
        output.message("Database enumeration unavailable, nothing cleaned.");
        return Ok(());
    };

    match output.format {
        OutputFormat::Json => output.json(&report),
        OutputFormat::Quiet => println!("{}", report.cleaned),
        OutputFormat::Human => {
            output.success(&format!(
                "Removed {} stale index(es), kept {} database(s)",
                report.cleaned, report.kept
            ));
            for error in &report.errors {
                println!("  ⚠ {}", error);
            }
        }
    }
    Ok(())
}

/// Show or clear the sync activity log
pub fn logs(
    service: &Arc<SyncService>,
    limit: Option<usize>,
    clear: bool,
    output: &Output,
) -> Result<()> {
    let log = service.sync_log();
    if clear {
        log.clear();
        output.success("Sync log cleared");
        return Ok(());
    }

    let mut entries = log.entries();
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    output.print_log(&entries);
    Ok(())
}
