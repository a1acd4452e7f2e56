//! Facade tying ingestion and retrieval to one embedder and one store.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::ingest::{IngestionPipeline, PipelineConfig};
use crate::models::{
    ChunkRecord, CreateDocument, CreatedDocument, Document, UpdateDocument, UpdatedDocument,
};
use crate::retrieve::{ContextBlock, RetrievalPipeline, DEFAULT_K};
use crate::store::{DocumentStore, VectorStore};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pipeline: PipelineConfig,
    /// `k` used when a retrieval request does not name one.
    pub default_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            default_k: DEFAULT_K,
        }
    }
}

/// The operations exposed to callers: create, update, delete, retrieve.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use knowledge_engine_core::embedding::HashingEmbedder;
/// use knowledge_engine_core::engine::{EngineConfig, KnowledgeEngine};
/// use knowledge_engine_core::store::memory::InMemoryStore;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let engine = KnowledgeEngine::with_store(
///     Arc::new(HashingEmbedder::new(64)),
///     Arc::new(InMemoryStore::new()),
///     EngineConfig::default(),
/// );
/// let created = engine
///     .create_document("t1", "Hours", "We open at nine.", None)
///     .await
///     .unwrap();
/// assert_eq!(created.chunk_count, 1);
///
/// let context = engine.retrieve("t1", "when do you open", None).await.unwrap();
/// assert!(context.render().starts_with("[Source 1]"));
/// # });
/// ```
#[derive(Clone)]
pub struct KnowledgeEngine {
    ingest: IngestionPipeline,
    retrieve: RetrievalPipeline,
    default_k: usize,
}

impl KnowledgeEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        documents: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorStore>,
        config: EngineConfig,
    ) -> Self {
        let retrieve = RetrievalPipeline::new(embedder.clone(), vectors.clone()).with_timeouts(
            config.pipeline.embed_timeout,
            config.pipeline.store_timeout,
        );
        Self {
            ingest: IngestionPipeline::new(embedder, documents, vectors, config.pipeline),
            retrieve,
            default_k: config.default_k.max(1),
        }
    }

    /// Build from one store implementing both storage traits.
    pub fn with_store<S>(embedder: Arc<dyn Embedder>, store: Arc<S>, config: EngineConfig) -> Self
    where
        S: DocumentStore + VectorStore + 'static,
    {
        Self::new(embedder, store.clone(), store, config)
    }

    pub async fn create_document(
        &self,
        tenant_id: &str,
        title: &str,
        content: &str,
        source: Option<&str>,
    ) -> Result<CreatedDocument, EngineError> {
        self.ingest
            .create(&CreateDocument {
                tenant_id: tenant_id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                source: source.map(str::to_string),
            })
            .await
    }

    pub async fn update_document(
        &self,
        tenant_id: &str,
        document_id: &str,
        title: &str,
        content: &str,
        source: Option<&str>,
    ) -> Result<UpdatedDocument, EngineError> {
        self.ingest
            .update(&UpdateDocument {
                tenant_id: tenant_id.to_string(),
                document_id: document_id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                source: source.map(str::to_string),
            })
            .await
    }

    pub async fn delete_document(&self, tenant_id: &str, document_id: &str) -> Result<(), EngineError> {
        self.ingest.delete(tenant_id, document_id).await
    }

    /// Retrieve up to `k` (or the configured default) chunks for `query`.
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        query: &str,
        k: Option<usize>,
    ) -> Result<ContextBlock, EngineError> {
        self.retrieve
            .retrieve(tenant_id, query, k.unwrap_or(self.default_k))
            .await
    }

    pub async fn get_document(&self, tenant_id: &str, document_id: &str) -> Result<Document, EngineError> {
        self.ingest.owned_document(tenant_id, document_id).await
    }

    pub async fn list_chunks(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChunkRecord>, EngineError> {
        self.ingest.list_chunks(tenant_id, document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::test_support::{unique_text, ScriptedEmbedder};

    fn engine() -> KnowledgeEngine {
        KnowledgeEngine::with_store(
            Arc::new(ScriptedEmbedder::healthy()),
            Arc::new(InMemoryStore::new()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_middle_chunk_is_best_match() {
        let engine = engine();
        let content = unique_text(1850);
        let created = engine
            .create_document("t1", "Hours", &content, Some("manual"))
            .await
            .unwrap();
        assert_eq!(created.chunk_count, 3);

        let chunks = engine.list_chunks("t1", &created.document_id).await.unwrap();
        // Tokens that only occur in the middle window.
        let phrase = &chunks[1].text[200..400];
        let context = engine.retrieve("t1", phrase, Some(1)).await.unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context.passages()[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_update_drops_old_text_from_results() {
        let engine = engine();
        let created = engine
            .create_document("t1", "Hours", &unique_text(1850), None)
            .await
            .unwrap();
        engine
            .update_document("t1", &created.document_id, "Hours", "closed on sundays", None)
            .await
            .unwrap();

        let chunks = engine.list_chunks("t1", &created.document_id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        let context = engine.retrieve("t1", "w0001 w0002 w0003", Some(5)).await.unwrap();
        assert!(context.texts().iter().all(|t| !t.contains("w0001")));
    }

    #[tokio::test]
    async fn test_delete_then_retrieve_is_empty() {
        let engine = engine();
        let created = engine
            .create_document("t1", "Parking", "parking is free after six", None)
            .await
            .unwrap();
        engine.delete_document("t1", &created.document_id).await.unwrap();
        let context = engine.retrieve("t1", "parking", None).await.unwrap();
        assert!(context.is_empty());
        assert!(matches!(
            engine.get_document("t1", &created.document_id).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_chunks_requires_ownership() {
        let engine = engine();
        let created = engine
            .create_document("t1", "Parking", "parking is free after six", None)
            .await
            .unwrap();
        assert!(matches!(
            engine.list_chunks("t2", &created.document_id).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_default_k_applies() {
        let config = EngineConfig {
            default_k: 2,
            pipeline: PipelineConfig::default(),
        };
        let engine = KnowledgeEngine::with_store(
            Arc::new(ScriptedEmbedder::healthy()),
            Arc::new(InMemoryStore::new()),
            config,
        );
        for title in ["a", "b", "c"] {
            engine
                .create_document("t1", title, &format!("{title} shared words"), None)
                .await
                .unwrap();
        }
        let context = engine.retrieve("t1", "shared words", None).await.unwrap();
        assert_eq!(context.len(), 2);
    }
}
