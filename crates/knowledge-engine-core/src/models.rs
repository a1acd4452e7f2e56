//! Core data models used throughout Knowledge Engine.
//!
//! These types represent the documents, chunks, and request/response
//! shapes that flow through the ingestion and retrieval pipelines.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Source label applied when a caller does not provide one.
pub const DEFAULT_SOURCE: &str = "manual";

/// A tenant-owned document row.
///
/// The document's retrievable content lives in its [`ChunkRecord`]s; the
/// row itself only carries descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub source: String,
    /// Unix seconds, UTC.
    pub created_at: i64,
    /// Unix seconds, UTC.
    pub updated_at: i64,
}

/// One persisted chunk: the unit of storage, rollback, and retrieval.
///
/// A record carries everything needed to restore it verbatim, so a
/// snapshot of a document's records is a complete rollback payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub tenant_id: String,
    pub document_id: String,
    /// Zero-based position in the source text.
    pub chunk_index: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Store-specific similarity; higher is better. Only meaningful for
    /// ordering results of a single store.
    pub score: f32,
}

/// A chunk produced by the chunker, before embedding.
///
/// `start` and `end` are character offsets of the window in the
/// normalized source text; `text` is that window trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Input for creating a document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDocument {
    pub tenant_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Input for replacing a document's content and metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocument {
    pub tenant_id: String,
    pub document_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedDocument {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedDocument {
    pub chunk_count: usize,
}

/// Trimmed, required-field-checked document input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidatedInput {
    pub tenant_id: String,
    pub title: String,
    pub content: String,
    pub source: String,
}

impl CreateDocument {
    pub(crate) fn validate(&self) -> Result<ValidatedInput, EngineError> {
        validate_fields(&self.tenant_id, &self.title, &self.content, self.source.as_deref())
    }
}

impl UpdateDocument {
    pub(crate) fn validate(&self) -> Result<(ValidatedInput, String), EngineError> {
        let input =
            validate_fields(&self.tenant_id, &self.title, &self.content, self.source.as_deref())?;
        let document_id = required("document_id", &self.document_id)?;
        Ok((input, document_id))
    }
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("missing {field}")));
    }
    Ok(trimmed.to_string())
}

fn validate_fields(
    tenant_id: &str,
    title: &str,
    content: &str,
    source: Option<&str>,
) -> Result<ValidatedInput, EngineError> {
    let tenant_id = required("tenant_id", tenant_id)?;
    let title = required("title", title)?;
    let content = required("content", content)?;
    let source = source
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SOURCE)
        .to_string();

    Ok(ValidatedInput {
        tenant_id,
        title,
        content,
        source,
    })
}
