//! Document command handlers
//!
//! Direct access to the active local store, mainly for seeding and
//! inspecting data around a sync.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use scribe_core::{Document, DocumentSummary, SyncService};

use crate::output::{Output, OutputFormat};

/// Parse a JSON object into a document; `_id` is required
pub fn parse_document(json: &str) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(json).context("Invalid JSON")?;
    let Some(doc) = Document::from_value(value) else {
        bail!("A document must be a JSON object");
    };
    if doc.id().map_or(true, str::is_empty) {
        bail!("A document needs a non-empty \"_id\"");
    }
    Ok(doc)
}

/// Create or update a document
pub async fn put(service: &Arc<SyncService>, json: String, output: &Output) -> Result<()> {
    let doc = parse_document(&json)?;
    let id = doc.id().unwrap_or_default().to_string();

    let store = service.database().await?;
    let rev = store.put(doc).map_err(|e| match e.recovery_suggestion() {
        Some(hint) => anyhow!("Failed to save {}: {}\n{}", id, e, hint),
        None => anyhow!("Failed to save {}: {}", id, e),
    })?;

    match output.format {
        OutputFormat::Json => output.json(&serde_json::json!({"id": id, "rev": rev})),
        OutputFormat::Quiet => println!("{}", rev),
        OutputFormat::Human => output.success(&format!("Saved {} at {}", id, rev)),
    }
    Ok(())
}

/// Show a single document
pub async fn get(service: &Arc<SyncService>, id: String, output: &Output) -> Result<()> {
    let store = service.database().await?;
    let Some(doc) = store.get(&id)? else {
        bail!("Document not found: {}", id);
    };

    match output.format {
        OutputFormat::Quiet => println!("{}", doc.rev().unwrap_or_default()),
        _ => output.json(&doc),
    }
    Ok(())
}

/// List documents, optionally of one type
pub async fn list(
    service: &Arc<SyncService>,
    doc_type: Option<String>,
    output: &Output,
) -> Result<()> {
    let store = service.database().await?;
    let docs = match doc_type {
        Some(ref t) => store.docs_by_type(t)?,
        None => store.all_docs()?,
    };

    let summaries: Vec<DocumentSummary> = docs.iter().map(Document::summary).collect();
    output.print_documents(&summaries);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let doc = parse_document(r#"{"_id": "story-1", "type": "story", "title": "Dawn"}"#)
            .unwrap();
        assert_eq!(doc.id(), Some("story-1"));
        assert_eq!(doc.doc_type(), Some("story"));
        assert_eq!(doc.title(), Some("Dawn"));
    }

    #[test]
    fn test_parse_document_rejects_bad_input() {
        assert!(parse_document("not json").is_err());
        assert!(parse_document("[1, 2]").is_err());
        assert!(parse_document(r#"{"type": "story"}"#).is_err());
        assert!(parse_document(r#"{"_id": ""}"#).is_err());
    }
}
