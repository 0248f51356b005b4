//! Scribe CLI
//!
//! Command-line front end for the Scribe sync core: inspect the local
//! store, push and pull against the remote, run live sync and the
//! maintenance jobs.

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scribe_core::{Config, Direction, FsPlatform, HttpConnector, SyncService, User};

mod commands;
mod network;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Scribe - local-first document store with remote sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Act as this user instead of the anonymous one
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Log debug output (SCRIBE_LOG overrides the level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active store and sync status
    Status,
    /// Push local changes to the remote once
    Push {
        /// Remote URL, overriding the configured one
        #[arg(long)]
        url: Option<String>,
    },
    /// Pull remote changes once
    Pull {
        /// Remote URL, overriding the configured one
        #[arg(long)]
        url: Option<String>,
    },
    /// Run live sync until interrupted
    Live {
        /// Remote URL, overriding the configured one
        #[arg(long)]
        url: Option<String>,
    },
    /// Check storage usage against the quota
    Health,
    /// Remove index databases of inactive stores
    Cleanup,
    /// Show the sync activity log
    Logs {
        /// Show at most this many entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Clear the log instead
        #[arg(long)]
        clear: bool,
    },
    /// Create or update a document from JSON
    Put {
        /// Document JSON, including "_id"
        json: String,
    },
    /// Show a document
    Get {
        /// Document ID
        id: String,
    },
    /// List documents
    #[command(alias = "ls")]
    List {
        /// Only documents of this type
        #[arg(short = 't', long = "type")]
        doc_type: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (remote_url, app_origin, url_mode, sync_enabled, ...)
        key: String,
        /// Configuration value ("none" clears optional keys)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need a store
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, &output)
            }
        };
    }

    let mut config = Config::load()?;
    init_logging(&config, cli.verbose);

    // Only `live` keeps replication running; the rest drive it explicitly
    if !matches!(cli.command, Commands::Live { .. }) {
        config.sync_enabled = false;
    }

    let platform = Arc::new(FsPlatform::new(
        config.data_dir.clone(),
        config.storage_quota_bytes,
    ));
    let service = SyncService::new(config, Arc::new(HttpConnector), platform);

    let user = cli.user.map(User::new).unwrap_or_else(User::anonymous);
    service.switch_to_user(user).await?;
    service.wait_for_background().await;

    let result = run(&service, cli.command, &output).await;
    service.shutdown().await;
    result
}

async fn run(service: &Arc<SyncService>, command: Commands, output: &Output) -> Result<()> {
    match command {
        Commands::Status => commands::status::show(service, output).await,
        Commands::Push { url } => {
            commands::sync::run_once(service, Direction::Push, url, output).await
        }
        Commands::Pull { url } => {
            commands::sync::run_once(service, Direction::Pull, url, output).await
        }
        Commands::Live { url } => commands::sync::live(service, url, output).await,
        Commands::Health => commands::maintenance::health(service, output).await,
        Commands::Cleanup => commands::maintenance::cleanup(service, output).await,
        Commands::Logs { limit, clear } => {
            commands::maintenance::logs(service, limit, clear, output)
        }
        Commands::Put { json } => commands::document::put(service, json, output).await,
        Commands::Get { id } => commands::document::get(service, id, output).await,
        Commands::List { doc_type } => commands::document::list(service, doc_type, output).await,
        Commands::Config { .. } => unreachable!(), // Handled in main
    }
}

/// Log to stderr, or to config.log_file when set
///
/// Warnings only by default; `--verbose` raises that to debug and
/// SCRIBE_LOG sets the level outright.
fn init_logging(config: &Config, verbose: bool) {
    let level = std::env::var("SCRIBE_LOG").unwrap_or_else(|_| {
        if verbose {
            "debug".to_string()
        } else {
            "warn".to_string()
        }
    });
    let env_filter = EnvFilter::new(format!("scribe_core={0},scribe_cli={0}", level));

    match config.log_file {
        Some(ref path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                    return;
                }
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
