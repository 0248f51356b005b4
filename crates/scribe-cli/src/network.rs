//! Connectivity probe feeding the sync status
//!
//! The CLI has no OS network events to listen to, so `live` polls the remote
//! host with a plain TCP connect and reports the result as the online flag.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `host:port` to probe for a remote URL
fn probe_address(remote_url: &str) -> Option<String> {
    let url = Url::parse(remote_url).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}:{}", host, port))
}

/// Spawn a probe of `remote_url` every `interval`
///
/// The task stops once every receiver is gone. Returns `None` when the URL
/// has no host to probe.
pub fn watch_connectivity(remote_url: &str, interval: Duration) -> Option<watch::Receiver<bool>> {
    let address = probe_address(remote_url)?;
    let (tx, rx) = watch::channel(true);

    tokio::spawn(async move {
        loop {
            let online = matches!(
                tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&address)).await,
                Ok(Ok(_))
            );
            tx.send_if_modified(|current| {
                let changed = *current != online;
                *current = online;
                changed
            });
            debug!("Connectivity to {}: {}", address, online);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tx.closed() => break,
            }
        }
    });

    Some(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_probe_address() {
        assert_eq!(
            probe_address("http://localhost:5984/stories").as_deref(),
            Some("localhost:5984")
        );
        assert_eq!(
            probe_address("https://writer.example.com/_db/stories").as_deref(),
            Some("writer.example.com:443")
        );
        assert_eq!(probe_address("not a url"), None);
    }

    #[tokio::test]
    async fn test_reports_reachable_then_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{}/stories", port);

        let mut online = watch_connectivity(&url, Duration::from_millis(20)).unwrap();
        assert!(*online.borrow_and_update());

        drop(listener);
        online.wait_for(|up| !*up).await.unwrap();
    }
}
