//! Push, pull and live sync command handlers

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use scribe_core::{Direction, SyncService};

use crate::network;
use crate::output::Output;

/// Replicate once in `direction`
pub async fn run_once(
    service: &Arc<SyncService>,
    direction: Direction,
    url: Option<String>,
    output: &Output,
) -> Result<()> {
    output.message("Connecting to remote...");
    if !service.connect_remote(url.as_deref()).await? {
        bail!(unavailable_message(service));
    }

    let result = match direction {
        Direction::Push => service.push().await,
        Direction::Pull => service.pull().await,
    };

    match result {
        Ok(result) => {
            let verb = match direction {
                Direction::Push => "Pushed",
                Direction::Pull => "Pulled",
            };
            output.success(&format!("{} {} document(s)", verb, result.docs_processed));
            Ok(())
        }
        Err(e) => bail!("{} failed: {}", direction, e.user_message()),
    }
}

/// Run live sync and print every status change until Ctrl-C
pub async fn live(service: &Arc<SyncService>, url: Option<String>, output: &Output) -> Result<()> {
    // Setup may already have started it when sync is enabled
    if (url.is_some() || !service.controller().is_live().await)
        && !service.start_live_sync(url.as_deref()).await?
    {
        bail!(unavailable_message(service));
    }

    let store = service.database().await?;
    let remote_url = service
        .controller()
        .settings()
        .resolve_url(store.name(), url.as_deref());
    if let Some(online) = remote_url.as_deref().and_then(|remote_url| {
        network::watch_connectivity(remote_url, service.config().live_poll_interval())
    }) {
        service.observe_network(online);
    }

    output.message("Live sync running. Press Ctrl-C to stop.");
    let mut status = service.subscribe_status();
    let initial = status.borrow_and_update().clone();
    output.print_status(&initial);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                output.print_status(&current);
            }
            _ = &mut shutdown => {
                info!("Interrupted, stopping live sync");
                break;
            }
        }
    }

    service.stop_live_sync().await;
    output.success("Live sync stopped");
    Ok(())
}

/// Explain why no remote handle could be established
fn unavailable_message(service: &SyncService) -> String {
    match service.status().error {
        Some(error) => error,
        None => "No remote configured. Set one with:\n  \
                 scribe config set remote_url http://localhost:5984\n  \
                 or\n  \
                 scribe config set app_origin https://writer.example.com"
            .to_string(),
    }
}
