//! Status command handler

use std::sync::Arc;

use anyhow::Result;

use scribe_core::SyncService;

use crate::output::{status_line, Output, OutputFormat};

/// Show the active store, its remote and the current sync status
pub async fn show(service: &Arc<SyncService>, output: &Output) -> Result<()> {
    let store = service.database().await?;
    let config = service.config();
    let remote_url = service
        .controller()
        .settings()
        .resolve_url(store.name(), None);
    let status = service.status();
    let doc_count = store.doc_count()?;

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({
                "store": store.name(),
                "documents": doc_count,
                "remote_url": remote_url,
                "url_mode": config.url_mode.to_string(),
                "sync_enabled": config.sync_enabled,
                "status": status,
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", store.name());
        }
        OutputFormat::Human => {
            println!("Scribe Status");
            println!("=============");
            println!();
            println!("Local store:");
            println!("  Name:      {}", store.name());
            println!("  Location:  {}", config.data_dir.display());
            println!("  Documents: {}", doc_count);
            println!();
            println!("Remote:");
            println!(
                "  URL:       {}",
                remote_url.as_deref().unwrap_or("(not configured)")
            );
            println!("  URL mode:  {}", config.url_mode);
            println!(
                "  Live sync: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!();
            println!("Sync: {}", status_line(&status));
        }
    }

    Ok(())
}
