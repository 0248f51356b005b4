//! Output formatting for CLI
//!
//! Every command prints through [`Output`] so that `--json` and `--quiet`
//! behave the same everywhere:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use scribe_core::sync::SyncLogEntry;
use scribe_core::{DocumentSummary, SyncStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
    }

    /// Print a sync status snapshot
    pub fn print_status(&self, status: &SyncStatus) {
        match self.format {
            OutputFormat::Human => println!("{}", status_line(status)),
            OutputFormat::Json => match serde_json::to_string(status) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("Failed to serialize status: {}", e),
            },
            OutputFormat::Quiet => {}
        }
    }

    /// Print document summaries
    pub fn print_documents(&self, docs: &[DocumentSummary]) {
        match self.format {
            OutputFormat::Human => {
                if docs.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for doc in docs {
                    println!(
                        "{} | {} | {}",
                        truncate(&doc.id, 36),
                        doc.doc_type.as_deref().unwrap_or("-"),
                        truncate(doc.title.as_deref().unwrap_or(""), 40)
                    );
                }
                println!("\n{} document(s)", docs.len());
            }
            OutputFormat::Json => self.json(docs),
            OutputFormat::Quiet => {
                for doc in docs {
                    println!("{}", doc.id);
                }
            }
        }
    }

    /// Print sync log entries, most recent first
    pub fn print_log(&self, entries: &[SyncLogEntry]) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No sync activity recorded.");
                    return;
                }
                for entry in entries {
                    let mut line = format!(
                        "{} [{:?}] {} ({})",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.kind,
                        entry.action,
                        entry.user_id
                    );
                    if let Some(count) = entry.item_count {
                        line.push_str(&format!(", {} item(s)", count));
                    }
                    if let Some(ms) = entry.duration_ms {
                        line.push_str(&format!(", {} ms", ms));
                    }
                    println!("{}", line);
                    if let Some(ref details) = entry.details {
                        println!("    {}", details);
                    }
                }
            }
            OutputFormat::Json => self.json(entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One-line human summary of a status snapshot
pub fn status_line(status: &SyncStatus) -> String {
    let state = if !status.is_online {
        "offline"
    } else if status.is_connecting {
        "connecting"
    } else if status.is_syncing {
        "syncing"
    } else if status.error.is_some() {
        "error"
    } else {
        "idle"
    };

    let mut line = state.to_string();
    if let Some(ref progress) = status.sync_progress {
        match progress.total_docs {
            Some(total) => line.push_str(&format!(
                " | {} {}/{}",
                progress.operation, progress.docs_processed, total
            )),
            None => line.push_str(&format!(
                " | {} {}",
                progress.operation, progress.docs_processed
            )),
        }
    }
    if let Some(ref error) = status.error {
        line.push_str(&format!(" | {}", error));
    }
    if let Some(at) = status.last_sync_at {
        line.push_str(&format!(" | last sync {}", at.format("%H:%M:%S")));
    }
    line
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{Direction, SyncProgress};

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_status_line_states() {
        let idle = SyncStatus::default();
        assert_eq!(status_line(&idle), "idle");

        let offline = SyncStatus {
            is_online: false,
            is_syncing: true,
            ..Default::default()
        };
        assert_eq!(status_line(&offline), "offline");

        let failed = SyncStatus {
            error: Some("Cannot reach sync server".to_string()),
            ..Default::default()
        };
        assert_eq!(status_line(&failed), "error | Cannot reach sync server");
    }

    #[test]
    fn test_status_line_progress() {
        let mut progress = SyncProgress::new(Direction::Pull);
        progress.docs_processed = 3;
        progress.total_docs = Some(10);
        let status = SyncStatus {
            is_syncing: true,
            sync_progress: Some(progress),
            ..Default::default()
        };
        assert_eq!(status_line(&status), "syncing | pull 3/10");
    }
}
