//! Remote document store access
//!
//! The remote handle is built by a [`RemoteConnector`] injected into the sync
//! service. The default [`HttpConnector`] produces an [`HttpRemote`]; tests
//! inject connectors returning in-process peers.

pub mod http;
pub mod resolve;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::error::SyncResult;
use crate::replication::ReplicationPeer;

pub use self::http::HttpRemote;
pub use self::resolve::{resolve_remote_url, DIRECT_PORT, PROXY_PREFIX};

/// How the remote URL is derived from the application origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMode {
    /// Decide from the origin port
    #[default]
    Auto,
    /// Always address the document server directly
    Direct,
    /// Always go through the reverse proxy path
    Proxy,
}

impl fmt::Display for UrlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlMode::Auto => write!(f, "auto"),
            UrlMode::Direct => write!(f, "direct"),
            UrlMode::Proxy => write!(f, "proxy"),
        }
    }
}

impl FromStr for UrlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(UrlMode::Auto),
            "direct" => Ok(UrlMode::Direct),
            "proxy" => Ok(UrlMode::Proxy),
            other => Err(format!("Unknown URL mode: {}", other)),
        }
    }
}

/// Builds remote handles
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Construct a handle for the database at `url`
    ///
    /// Must not contact the server; reachability is probed separately.
    async fn connect(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> SyncResult<Arc<dyn ReplicationPeer>>;
}

/// Connector producing HTTP remotes
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

#[async_trait]
impl RemoteConnector for HttpConnector {
    async fn connect(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> SyncResult<Arc<dyn ReplicationPeer>> {
        Ok(Arc::new(HttpRemote::new(url, credentials)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_mode_parse() {
        assert_eq!("auto".parse::<UrlMode>().unwrap(), UrlMode::Auto);
        assert_eq!("Direct".parse::<UrlMode>().unwrap(), UrlMode::Direct);
        assert_eq!("PROXY".parse::<UrlMode>().unwrap(), UrlMode::Proxy);
        assert!("sideways".parse::<UrlMode>().is_err());
    }

    #[test]
    fn test_url_mode_display_roundtrips() {
        for mode in [UrlMode::Auto, UrlMode::Direct, UrlMode::Proxy] {
            assert_eq!(mode.to_string().parse::<UrlMode>().unwrap(), mode);
        }
    }

    #[tokio::test]
    async fn test_http_connector_does_not_contact_server() {
        let remote = HttpConnector
            .connect("http://127.0.0.1:9/stories", None)
            .await
            .unwrap();
        assert_eq!(remote.name(), "http://127.0.0.1:9/stories");
    }
}
