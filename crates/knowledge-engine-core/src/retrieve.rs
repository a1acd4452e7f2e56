//! Retrieval pipeline and context assembly.
//!
//! [`RetrievalPipeline::retrieve`] embeds the query, asks the vector store
//! for the best `k` chunks of one tenant, and returns them as a
//! [`ContextBlock`]. The store's ranking is kept as-is.
//!
//! Retrieval fails closed: if the query cannot be embedded or the store
//! cannot be searched, the caller receives
//! [`EngineError::RetrievalUnavailable`], never an empty block. An empty
//! block always means "nothing relevant is stored".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::bounded::{embed_call, store_call};
use crate::embedding::Embedder;
use crate::error::{EngineError, Stage};
use crate::ingest::{DEFAULT_EMBED_TIMEOUT, DEFAULT_STORE_TIMEOUT};
use crate::models::{required, ScoredChunk};
use crate::store::VectorStore;

pub const DEFAULT_K: usize = 5;

/// One retrieved chunk, labelled with its 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub ordinal: usize,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

impl Passage {
    /// Source marker used in the rendered context, e.g. `[Source 2]`.
    pub fn marker(&self) -> String {
        format!("[Source {}]", self.ordinal)
    }
}

/// Ordered, best-first passages for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBlock {
    passages: Vec<Passage>,
}

impl ContextBlock {
    pub fn from_scored(chunks: Vec<ScoredChunk>) -> Self {
        let passages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, c)| Passage {
                ordinal: i + 1,
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                text: c.text,
                score: c.score,
            })
            .collect();
        Self { passages }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Chunk texts in rank order.
    pub fn texts(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.text.as_str()).collect()
    }

    /// Render as a prompt-ready block:
    ///
    /// ```text
    /// [Source 1]
    /// first chunk
    ///
    /// [Source 2]
    /// second chunk
    /// ```
    ///
    /// An empty block renders as an empty string.
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("{}\n{}", p.marker(), p.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Embeds queries and searches the vector store.
#[derive(Clone)]
pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    embed_timeout: Duration,
    store_timeout: Duration,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            vectors,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, embed_timeout: Duration, store_timeout: Duration) -> Self {
        self.embed_timeout = embed_timeout;
        self.store_timeout = store_timeout;
        self
    }

    /// Retrieve the `k` best chunks of `tenant_id` for `query`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a blank tenant or query, or `k == 0`.
    /// - [`EngineError::RetrievalUnavailable`] wrapping the embedder or store
    ///   failure (including timeouts and a query vector of the wrong width).
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<ContextBlock, EngineError> {
        let tenant_id = required("tenant_id", tenant_id)?;
        let query = required("query", query)?;
        if k == 0 {
            return Err(EngineError::Validation("k must be at least 1".to_string()));
        }

        let vector = embed_call(Stage::Embedding, self.embed_timeout, self.embedder.embed(&query))
            .await
            .map_err(unavailable)?;
        let expected = self.embedder.dims();
        if vector.len() != expected {
            return Err(unavailable(EngineError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }));
        }

        let mut hits = store_call(
            Stage::Searching,
            self.store_timeout,
            self.vectors.search(&tenant_id, &vector, k),
        )
        .await
        .map_err(unavailable)?;
        hits.truncate(k);

        tracing::debug!(tenant_id = %tenant_id, k, hits = hits.len(), "retrieved");
        Ok(ContextBlock::from_scored(hits))
    }
}

fn unavailable(e: EngineError) -> EngineError {
    tracing::warn!(error = %e, "retrieval unavailable");
    EngineError::RetrievalUnavailable(Box::new(e))
}
