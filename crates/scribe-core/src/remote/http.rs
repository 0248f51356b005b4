//! HTTP remote store
//!
//! Talks to a CouchDB-compatible server: `GET /{db}` for the probe,
//! `_changes`, `_revs_diff`, `_bulk_docs` with `new_edits: false`, and
//! `_local/` documents for checkpoints.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::config::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::models::Document;
use crate::replication::{ChangeRow, ChangesBatch, PeerInfo, ReplicationPeer, RevMap};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote document store reached over HTTP
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
    name: String,
    credentials: Option<Credentials>,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("name", &self.name)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl HttpRemote {
    /// Create a client for the database at `url`
    ///
    /// Credentials embedded in the URL are used when none are given.
    pub fn new(url: &str, credentials: Option<&Credentials>) -> SyncResult<Self> {
        let mut base = Url::parse(url)
            .map_err(|e| SyncError::Unknown(format!("Invalid remote URL {}: {}", url, e)))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Unknown(format!("Invalid remote URL {}", url)));
        }

        let embedded = if base.username().is_empty() {
            None
        } else {
            Some(Credentials {
                username: base.username().to_string(),
                password: base.password().unwrap_or_default().to_string(),
            })
        };
        let _ = base.set_username("");
        let _ = base.set_password(None);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::from_reqwest(&e))?;

        Ok(Self {
            client,
            name: base.as_str().trim_end_matches('/').to_string(),
            base,
            credentials: credentials.cloned().or(embedded),
        })
    }

    /// Database URL without credentials
    pub fn url(&self) -> &str {
        &self.name
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.credentials {
            Some(creds) => builder.basic_auth(&creds.username, Some(&creds.password)),
            None => builder,
        }
    }

    /// Send a request, rejecting auth failures and non-JSON responses
    async fn send(&self, builder: RequestBuilder) -> SyncResult<Response> {
        let response = builder.send().await.map_err(|e| SyncError::from_reqwest(&e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::AuthenticationFailed);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("json") {
            return Err(SyncError::InvalidServerResponse(format!(
                "{} returned {} with content type '{}'",
                self.name, status, content_type
            )));
        }

        Ok(response)
    }

    /// Decode a successful JSON response, classifying error bodies
    async fn json<T: DeserializeOwned>(&self, response: Response) -> SyncResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let error = body.get("error").and_then(Value::as_str).unwrap_or("error");
            let reason = body.get("reason").and_then(Value::as_str).unwrap_or("");
            return Err(SyncError::classify(&format!(
                "{} {}: {}",
                status.as_u16(),
                error,
                reason
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::InvalidServerResponse(e.to_string()))
    }

    async fn local_doc(&self, replication_id: &str) -> SyncResult<Option<Value>> {
        let url = self.endpoint(&["_local", replication_id]);
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.json(response).await.map(Some)
    }
}

#[derive(Debug, Deserialize)]
struct DbInfoResponse {
    db_name: String,
    #[serde(default)]
    doc_count: u64,
    #[serde(default)]
    update_seq: Value,
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    results: Vec<ChangeResult>,
    last_seq: Value,
    #[serde(default)]
    pending: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChangeResult {
    seq: Value,
    id: String,
    changes: Vec<ChangeRev>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChangeRev {
    rev: String,
}

#[derive(Debug, Deserialize)]
struct RevsDiffEntry {
    #[serde(default)]
    missing: Vec<String>,
}

/// Sequences are opaque; numbers and strings are both accepted
fn seq_string(seq: &Value) -> String {
    match seq {
        Value::String(s) => s.clone(),
        Value::Null => "0".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ReplicationPeer for HttpRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn info(&self) -> SyncResult<PeerInfo> {
        let url = self.endpoint(&[]);
        let response = self.send(self.request(Method::GET, url.clone())).await?;

        let response = if response.status() == StatusCode::NOT_FOUND {
            info!("Creating remote database {}", self.name);
            let created = self.send(self.request(Method::PUT, url.clone())).await?;
            self.json::<Value>(created).await?;
            self.send(self.request(Method::GET, url)).await?
        } else {
            response
        };

        let info: DbInfoResponse = self.json(response).await?;
        debug!("Remote {} has {} documents", info.db_name, info.doc_count);
        Ok(PeerInfo {
            db_name: info.db_name,
            doc_count: info.doc_count,
            update_seq: seq_string(&info.update_seq),
        })
    }

    async fn changes(&self, since: &str, limit: usize) -> SyncResult<ChangesBatch> {
        let url = self.endpoint(&["_changes"]);
        let limit = limit.to_string();
        let builder = self.request(Method::GET, url).query(&[
            ("since", since),
            ("limit", limit.as_str()),
            ("include_docs", "true"),
            ("style", "all_docs"),
        ]);
        let response: ChangesResponse = self.json(self.send(builder).await?).await?;

        let results = response
            .results
            .into_iter()
            .filter_map(|row| {
                let rev = row.changes.into_iter().next()?.rev;
                Some(ChangeRow {
                    seq: seq_string(&row.seq),
                    id: row.id,
                    rev,
                    deleted: row.deleted,
                    doc: row.doc.and_then(Document::from_value),
                })
            })
            .collect();

        Ok(ChangesBatch {
            results,
            last_seq: seq_string(&response.last_seq),
            pending: response.pending,
        })
    }

    async fn revs_diff(&self, revs: &RevMap) -> SyncResult<RevMap> {
        let url = self.endpoint(&["_revs_diff"]);
        let builder = self.request(Method::POST, url).json(revs);
        let response: BTreeMap<String, RevsDiffEntry> =
            self.json(self.send(builder).await?).await?;

        Ok(response
            .into_iter()
            .filter(|(_, entry)| !entry.missing.is_empty())
            .map(|(id, entry)| (id, entry.missing))
            .collect())
    }

    async fn bulk_docs(&self, docs: Vec<Document>) -> SyncResult<usize> {
        let total = docs.len();
        let url = self.endpoint(&["_bulk_docs"]);
        let builder = self
            .request(Method::POST, url)
            .json(&json!({ "docs": docs, "new_edits": false }));
        let results: Vec<Value> = self.json(self.send(builder).await?).await?;

        // With new_edits=false only failures are reported
        let failed = results.iter().filter(|r| r.get("error").is_some()).count();
        Ok(total.saturating_sub(failed))
    }

    async fn get_checkpoint(&self, replication_id: &str) -> SyncResult<Option<String>> {
        Ok(self
            .local_doc(replication_id)
            .await?
            .and_then(|doc| doc.get("last_seq").map(seq_string)))
    }

    async fn put_checkpoint(&self, replication_id: &str, seq: &str) -> SyncResult<()> {
        let mut body = json!({
            "_id": format!("_local/{}", replication_id),
            "last_seq": seq,
        });
        if let Some(rev) = self
            .local_doc(replication_id)
            .await?
            .and_then(|doc| doc.get("_rev").cloned())
        {
            body["_rev"] = rev;
        }

        let url = self.endpoint(&["_local", replication_id]);
        let builder = self.request(Method::PUT, url).json(&body);
        self.json::<Value>(self.send(builder).await?).await?;
        Ok(())
    }
}
