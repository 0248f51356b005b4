//! Config command handlers

use anyhow::{anyhow, bail, Context, Result};

use scribe_core::{Config, UrlMode};

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
pub const KEYS: &[&str] = &[
    "data_dir",
    "app_origin",
    "remote_url",
    "url_mode",
    "remote_username",
    "remote_password",
    "sync_enabled",
    "reserved_store",
    "storage_quota_bytes",
    "live_poll_interval_secs",
    "log_file",
];

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({
                "data_dir": config.data_dir,
                "app_origin": config.app_origin,
                "remote_url": config.remote_url,
                "url_mode": config.url_mode,
                "remote_username": config.remote_username,
                "sync_enabled": config.sync_enabled,
                "reserved_store": config.reserved_store,
                "storage_quota_bytes": config.storage_quota_bytes,
                "live_poll_interval_secs": config.live_poll_interval_secs,
                "log_file": config.log_file
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let unset = || "(not set)".to_string();
            println!("Configuration:");
            println!("  data_dir:                {}", config.data_dir.display());
            println!(
                "  app_origin:              {}",
                config.app_origin.clone().unwrap_or_else(unset)
            );
            println!(
                "  remote_url:              {}",
                config.remote_url.clone().unwrap_or_else(unset)
            );
            println!("  url_mode:                {}", config.url_mode);
            println!(
                "  remote_username:         {}",
                config.remote_username.clone().unwrap_or_else(unset)
            );
            println!(
                "  remote_password:         {}",
                if config.remote_password.is_some() {
                    "********".to_string()
                } else {
                    unset()
                }
            );
            println!("  sync_enabled:            {}", config.sync_enabled);
            println!("  reserved_store:          {}", config.reserved_store);
            println!(
                "  storage_quota_bytes:     {}",
                config
                    .storage_quota_bytes
                    .map(|q| q.to_string())
                    .unwrap_or_else(unset)
            );
            println!(
                "  live_poll_interval_secs: {}",
                config.live_poll_interval_secs
            );
            println!(
                "  log_file:                {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(unset)
            );
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value and save it
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    apply(&mut config, &key, &value)?;
    config.save().context("Failed to save configuration")?;

    let shown = if key == "remote_password" {
        "********"
    } else {
        value.as_str()
    };
    output.success(&format!("Set {} = {}", key, shown));
    Ok(())
}

/// Apply one `key = value` assignment; "" or "none" clears optional keys
pub fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let optional = || {
        if value.is_empty() || value == "none" {
            None
        } else {
            Some(value.to_string())
        }
    };

    match key {
        "data_dir" => config.data_dir = value.into(),
        "app_origin" => config.app_origin = optional(),
        "remote_url" => config.remote_url = optional(),
        "url_mode" => {
            config.url_mode = value.parse::<UrlMode>().map_err(|e| {
                anyhow!("{}. Use 'auto', 'direct' or 'proxy'.", e)
            })?;
        }
        "remote_username" => config.remote_username = optional(),
        "remote_password" => config.remote_password = optional(),
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "reserved_store" => {
            if value.is_empty() {
                bail!("reserved_store cannot be empty");
            }
            config.reserved_store = value.to_string();
        }
        "storage_quota_bytes" => {
            config.storage_quota_bytes = match optional() {
                Some(v) => Some(
                    v.parse()
                        .context("Invalid value for storage_quota_bytes. Use a byte count.")?,
                ),
                None => None,
            };
        }
        "live_poll_interval_secs" => {
            config.live_poll_interval_secs = value
                .parse()
                .context("Invalid value for live_poll_interval_secs. Use whole seconds.")?;
        }
        "log_file" => config.log_file = optional().map(Into::into),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS.join(", ")
            );
        }
    }
    Ok(())
}
