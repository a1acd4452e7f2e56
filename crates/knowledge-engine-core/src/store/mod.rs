//! Storage abstraction for Knowledge Engine.
//!
//! Two traits split the persistence surface the pipelines consume:
//!
//! | Trait | Holds | Used for |
//! |-------|-------|----------|
//! | [`DocumentStore`] | document rows | ownership checks, metadata |
//! | [`VectorStore`] | chunk records | atomic insert, bulk delete, snapshot, similarity search |
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must classify their failures via [`StoreError`] so callers can tell
//! transient failures from permanent ones.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{ChunkRecord, Document, ScoredChunk};

/// Document row persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document row.
    async fn insert_document(&self, doc: &Document) -> Result<(), StoreError>;

    /// Fetch a document by ID regardless of tenant.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    /// Overwrite title, source, and `updated_at` of an existing row.
    async fn update_document_metadata(
        &self,
        document_id: &str,
        title: &str,
        source: &str,
        updated_at: i64,
    ) -> Result<(), StoreError>;

    /// Delete a document row. Deleting a missing row is not an error.
    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError>;
}

/// Chunk persistence and similarity search.
///
/// # Operations
///
/// | Method | Contract |
/// |--------|----------|
/// | [`insert_chunks`](VectorStore::insert_chunks) | all records become visible, or none do |
/// | [`delete_chunks`](VectorStore::delete_chunks) | removes every record of a document |
/// | [`list_chunks`](VectorStore::list_chunks) | full records, ascending `chunk_index` |
/// | [`search`](VectorStore::search) | best-first, scoped to one tenant, at most `k` |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StoreError>;

    async fn delete_chunks(&self, document_id: &str) -> Result<(), StoreError>;

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Return up to `k` chunks of `tenant_id` ranked by descending
    /// similarity. Chunks whose vector length differs from `query` must
    /// never be scored.
    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}
