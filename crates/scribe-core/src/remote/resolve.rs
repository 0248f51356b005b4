//! Remote URL resolution
//!
//! The remote store lives either directly on the document server port or
//! behind a reverse proxy under `/_db/`. In [`UrlMode::Auto`] the choice is
//! made from the origin port alone:
//!
//! | origin port   | resolved URL                         |
//! |---------------|--------------------------------------|
//! | none/default  | `{scheme}://{host}/{db}`             |
//! | 5984          | `{scheme}://{host}:5984/{db}`        |
//! | anything else | `{scheme}://{host}:{port}/_db/{db}`  |

use url::Url;

use super::UrlMode;

/// Port the document server listens on when reached directly
pub const DIRECT_PORT: u16 = 5984;

/// Path prefix the reverse proxy mounts the document server under
pub const PROXY_PREFIX: &str = "_db";

/// Resolve the remote store URL for `db_name` from the application origin
///
/// Returns `None` when the origin is not an absolute URL with a host.
pub fn resolve_remote_url(origin: &str, db_name: &str, mode: UrlMode) -> Option<String> {
    let origin = Url::parse(origin).ok()?;
    let host = origin.host_str()?;
    let scheme = origin.scheme();
    let port = origin.port();

    let authority = match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let use_proxy = match mode {
        UrlMode::Direct => false,
        UrlMode::Proxy => true,
        UrlMode::Auto => matches!(port, Some(p) if p != DIRECT_PORT),
    };

    if use_proxy {
        Some(format!(
            "{}://{}/{}/{}",
            scheme, authority, PROXY_PREFIX, db_name
        ))
    } else {
        Some(format!("{}://{}/{}", scheme, authority, db_name))
    }
}
