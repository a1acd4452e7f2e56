//! In-memory [`DocumentStore`] and [`VectorStore`] implementation.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over the tenant's chunks.
//! Used by tests and by embedders of the core crate that need no durability.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{ChunkRecord, Document, ScoredChunk};

use super::{DocumentStore, VectorStore};

/// In-memory store for testing.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<ChunkRecord>>,
    min_score: Option<f32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            min_score: None,
        }
    }

    /// Drop search hits scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Number of stored document rows.
    pub fn document_count(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Number of stored chunk records across all documents.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("min_score", &self.min_score)
            .finish_non_exhaustive()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Permanent(format!("lock poisoned: {e}"))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if docs.contains_key(&doc.id) {
            return Err(StoreError::Permanent(format!(
                "document {} already exists",
                doc.id
            )));
        }
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(document_id).cloned())
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        title: &str,
        source: &str,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let doc = docs.get_mut(document_id).ok_or_else(|| {
            StoreError::Permanent(format!("document {document_id} does not exist"))
        })?;
        doc.title = title.to_string();
        doc.source = source.to_string();
        doc.updated_at = updated_at;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.remove(document_id);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StoreError> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        // Validate the whole batch before touching storage.
        for c in chunks {
            let duplicate = stored
                .iter()
                .chain(chunks.iter().filter(|o| !std::ptr::eq(*o, c)))
                .any(|o| o.document_id == c.document_id && o.chunk_index == c.chunk_index);
            if duplicate {
                return Err(StoreError::Permanent(format!(
                    "duplicate chunk ({}, {})",
                    c.document_id, c.chunk_index
                )));
            }
        }
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<(), StoreError> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        stored.retain(|c| c.document_id != document_id);
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut records: Vec<ChunkRecord> = stored
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        records.sort_by_key(|c| c.chunk_index);
        Ok(records)
    }

    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut candidates: Vec<ScoredChunk> = stored
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.vector.len() == query.len())
            .map(|c| ScoredChunk {
                document_id: c.document_id.clone(),
                chunk_index: c.chunk_index,
                text: c.text.clone(),
                score: cosine_similarity(query, &c.vector),
            })
            .filter(|c| self.min_score.map_or(true, |min| c.score >= min))
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        candidates.truncate(k);
        Ok(candidates)
    }
}
