//! Data models for the sync core
//!
//! Documents are schema-less JSON objects. The sync core only looks at the
//! `_id`/`_rev` concurrency tokens, the `type` discriminator and, for
//! progress reporting, a `title`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document type that never leaves the store it was written to
pub const SNAPSHOT_DOC_TYPE: &str = "story-snapshot";

/// A schema-less document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document with the given id
    pub fn new(id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("_id".to_string(), Value::String(id.into()));
        Self(map)
    }

    /// Create a document with an id and a `type` discriminator
    pub fn with_type(id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        let mut doc = Self::new(id);
        doc.set("type", Value::String(doc_type.into()));
        doc
    }

    /// Wrap a JSON value; only objects are documents
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(Value::as_str)
    }

    pub fn rev(&self) -> Option<&str> {
        self.0.get("_rev").and_then(Value::as_str)
    }

    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.0.insert("_rev".to_string(), Value::String(rev.into()));
    }

    /// The `type` discriminator
    pub fn doc_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    pub fn is_deleted(&self) -> bool {
        self.0
            .get("_deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Whether this document is a large snapshot kept out of replication
    pub fn is_snapshot(&self) -> bool {
        self.doc_type() == Some(SNAPSHOT_DOC_TYPE)
    }

    /// The `{id, type, title}` triple used in progress reports
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id().unwrap_or_default().to_string(),
            doc_type: self.doc_type().map(str::to_string),
            title: self.title().map(str::to_string),
        }
    }
}

/// Short description of a document in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub title: Option<String>,
}

/// The authenticated user as emitted by the identity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_anonymous: false,
        }
    }

    /// The logged-out, local-only user
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            is_anonymous: true,
        }
    }

    /// Identifier used in sync log entries
    pub fn log_id(&self) -> &str {
        if self.is_anonymous {
            "anonymous"
        } else {
            &self.id
        }
    }
}

/// Direction of a one-way replication, relative to the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Push,
    Pull,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
        }
    }
}

/// A parsed `{generation}-{hash}` revision token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub generation: u64,
    pub hash: String,
}

impl Revision {
    pub fn parse(rev: &str) -> Option<Self> {
        let (generation, hash) = rev.split_once('-')?;
        Some(Self {
            generation: generation.parse().ok()?,
            hash: hash.to_string(),
        })
    }

    /// First revision of a new document
    pub fn first() -> Self {
        Self::with_generation(1)
    }

    /// Revision that follows this one
    pub fn next(&self) -> Self {
        Self::with_generation(self.generation + 1)
    }

    fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            hash: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Deterministic winner between two revisions of one document
    ///
    /// Higher generation wins; equal generations compare the hash.
    pub fn wins_over(&self, other: &Revision) -> bool {
        (self.generation, &self.hash) > (other.generation, &other.hash)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_accessors() {
        let doc = Document::from_value(json!({
            "_id": "story-1",
            "_rev": "3-abc",
            "type": "story",
            "title": "The Long Night"
        }))
        .unwrap();

        assert_eq!(doc.id(), Some("story-1"));
        assert_eq!(doc.rev(), Some("3-abc"));
        assert_eq!(doc.doc_type(), Some("story"));
        assert!(!doc.is_snapshot());
        assert!(!doc.is_deleted());

        let summary = doc.summary();
        assert_eq!(summary.id, "story-1");
        assert_eq!(summary.title.as_deref(), Some("The Long Night"));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("story")).is_none());
    }

    #[test]
    fn test_snapshot_detection() {
        let doc = Document::with_type("snap-1", SNAPSHOT_DOC_TYPE);
        assert!(doc.is_snapshot());
    }

    #[test]
    fn test_revision_ordering() {
        let a = Revision::parse("2-aaa").unwrap();
        let b = Revision::parse("2-bbb").unwrap();
        let c = Revision::parse("10-000").unwrap();

        assert!(b.wins_over(&a));
        assert!(!a.wins_over(&b));
        assert!(c.wins_over(&b));
        assert!(Revision::parse("nonsense").is_none());
    }

    #[test]
    fn test_revision_next_bumps_generation() {
        let first = Revision::first();
        assert_eq!(first.generation, 1);
        let second = first.next();
        assert_eq!(second.generation, 2);
        assert!(second.to_string().starts_with("2-"));
    }

    #[test]
    fn test_direction_serialization() {
        assert_eq!(serde_json::to_string(&Direction::Push).unwrap(), "\"push\"");
        assert_eq!(Direction::Pull.to_string(), "pull");
    }

    #[test]
    fn test_user_log_id() {
        assert_eq!(User::anonymous().log_id(), "anonymous");
        assert_eq!(User::new("alice").log_id(), "alice");
    }
}
