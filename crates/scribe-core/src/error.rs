//! Sync error taxonomy
//!
//! Underlying failures (HTTP, transport, local store) are classified into a
//! small set of user-facing categories. Background sync never surfaces raw
//! errors; it publishes [`SyncError::user_message`] into the sync status.

use thiserror::Error;

use crate::storage::StoreError;

/// Errors produced by the sync core
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network failure or connection refused reaching the remote store
    #[error("Cannot reach the sync server: {0}")]
    RemoteUnreachable(String),

    /// Credentials rejected by the remote store
    #[error("Authentication with the sync server failed")]
    AuthenticationFailed,

    /// Remote did not respond in time
    #[error("Connection to the sync server timed out")]
    ConnectionTimeout,

    /// Remote answered with something that is not a document-protocol response
    #[error("Invalid response from the sync server: {0}")]
    InvalidServerResponse(String),

    /// No remote handle is established
    #[error("Remote database not available")]
    RemoteUnavailable,

    /// Manual replication exceeded its time bound
    #[error("Sync timed out after {0} seconds")]
    SyncTimeout(u64),

    /// No local store has been opened yet
    #[error("Database not initialized")]
    NotInitialized,

    /// Local store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else, with the original message
    #[error("Sync failed: {0}")]
    Unknown(String),
}

impl SyncError {
    /// Classify a raw failure message into the taxonomy
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("name or password is incorrect")
        {
            SyncError::AuthenticationFailed
        } else if lower.contains("timed out") || lower.contains("timeout") {
            SyncError::ConnectionTimeout
        } else if lower.contains("<!doctype")
            || lower.contains("<html")
            || lower.contains("unexpected token <")
            || lower.contains("expected value at line 1")
        {
            SyncError::InvalidServerResponse(message.to_string())
        } else if lower.contains("connection refused")
            || lower.contains("failed to fetch")
            || lower.contains("networkerror")
            || lower.contains("network error")
            || lower.contains("error trying to connect")
            || lower.contains("dns error")
        {
            SyncError::RemoteUnreachable(message.to_string())
        } else {
            SyncError::Unknown(message.to_string())
        }
    }

    /// Classify a transport error from the HTTP client
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return SyncError::ConnectionTimeout;
        }
        if let Some(status) = error.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return SyncError::AuthenticationFailed;
            }
        }
        if error.is_connect() {
            return SyncError::RemoteUnreachable(error.to_string());
        }
        if error.is_decode() {
            return SyncError::InvalidServerResponse(error.to_string());
        }
        SyncError::classify(&error.to_string())
    }

    /// Message shown to the user
    pub fn user_message(&self) -> String {
        match self {
            SyncError::RemoteUnreachable(_) => {
                "Cannot connect to the sync server. Check your network connection and that the server is running.".to_string()
            }
            SyncError::AuthenticationFailed => {
                "Authentication failed. Check the sync server credentials.".to_string()
            }
            SyncError::ConnectionTimeout => {
                "Connection timed out. The sync server is not responding.".to_string()
            }
            SyncError::InvalidServerResponse(_) => {
                "Invalid response from the sync server. Check the server URL and proxy configuration.".to_string()
            }
            SyncError::RemoteUnavailable => "Remote database not available".to_string(),
            SyncError::SyncTimeout(secs) => {
                format!("Sync timed out after {} seconds", secs)
            }
            SyncError::NotInitialized => "Database not initialized".to_string(),
            SyncError::Store(e) => match e.recovery_suggestion() {
                Some(hint) => format!("Local database error: {}. {}", e, hint),
                None => format!("Local database error: {}", e),
            },
            SyncError::Unknown(message) => format!("Sync failed: {}", message),
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth() {
        assert!(matches!(
            SyncError::classify("HTTP 401 Unauthorized"),
            SyncError::AuthenticationFailed
        ));
        assert!(matches!(
            SyncError::classify("Name or password is incorrect."),
            SyncError::AuthenticationFailed
        ));
    }

    #[test]
    fn test_classify_network() {
        assert!(matches!(
            SyncError::classify("error trying to connect: Connection refused (os error 111)"),
            SyncError::RemoteUnreachable(_)
        ));
    }

    #[test]
    fn test_classify_timeout() {
        assert!(matches!(
            SyncError::classify("operation timed out"),
            SyncError::ConnectionTimeout
        ));
    }

    #[test]
    fn test_classify_html_response() {
        let err = SyncError::classify("Unexpected token < in JSON: <!DOCTYPE html>");
        assert!(matches!(err, SyncError::InvalidServerResponse(_)));
        assert!(err.user_message().contains("proxy"));
    }

    #[test]
    fn test_classify_unknown_keeps_message() {
        let err = SyncError::classify("disk on fire");
        assert!(matches!(err, SyncError::Unknown(_)));
        assert!(err.user_message().contains("disk on fire"));
    }

    #[test]
    fn test_sync_timeout_message() {
        assert_eq!(
            SyncError::SyncTimeout(60).user_message(),
            "Sync timed out after 60 seconds"
        );
    }

    #[test]
    fn test_store_error_message_includes_hint() {
        let err = SyncError::Store(StoreError::Conflict {
            id: "story-1".to_string(),
        });
        let message = err.user_message();
        assert!(message.contains("story-1"));
        assert!(message.ends_with("then retry the edit."));

        let err = SyncError::Store(StoreError::Closed("stories".to_string()));
        assert_eq!(err.user_message(), "Local database error: Store 'stories' is closed");
    }
}
