//! Ingestion pipeline: create, update, and delete documents.
//!
//! Every operation drives a small state machine and logs each transition at
//! `debug` level. The destructive part of an operation (the "commit") runs in
//! a detached task, so dropping the caller's future cannot leave a document
//! half-written.
//!
//! # Update
//!
//! ```text
//! Validating → Snapshotting → Chunking → Embedding → Deleting → Persisting → UpdatingMetadata → Done
//!                                                     │            │
//!                                                     └─ failure ──┴─ failure → RollingBack
//! ```
//!
//! Embedding finishes before anything is deleted, so the window in which a
//! document has no chunks is one delete plus one insert. If the insert fails,
//! or the metadata update after it fails,
//! the snapshot taken before chunking is re-inserted and the caller receives
//! [`EngineError::PartialFailure`] describing both the failure and the
//! rollback outcome.
//!
//! # Concurrency
//!
//! With [`PipelineConfig::serialize_updates`] set, updates and deletes of
//! the same document ID are serialized within this process by
//! [`DocumentLocks`]. Writers in other processes sharing the same store are
//! not covered: the last insert wins, and a losing writer's rollback can
//! overwrite the winner's chunks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::OwnedMutexGuard;

use crate::bounded::{embed_call, store_call};
use crate::chunk::ChunkerConfig;
use crate::embedding::Embedder;
use crate::error::{EmbedError, EngineError, RollbackOutcome, Stage};
use crate::models::{
    required, ChunkRecord, CreateDocument, CreatedDocument, Document, TextChunk, UpdateDocument,
    UpdatedDocument,
};
use crate::store::{DocumentStore, VectorStore};

pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning for [`IngestionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunker: ChunkerConfig,
    /// Upper bound for one embedder call.
    pub embed_timeout: Duration,
    /// Upper bound for one store call.
    pub store_timeout: Duration,
    /// Chunks sent per [`Embedder::embed_batch`] call. `1` keeps the
    /// one-chunk-per-call baseline.
    pub embed_batch_size: usize,
    /// Embedder calls allowed in flight at once.
    pub embed_concurrency: usize,
    pub serialize_updates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            embed_batch_size: 1,
            embed_concurrency: 1,
            serialize_updates: true,
        }
    }
}

/// Per-document async locks.
///
/// Entries are pruned lazily: a lock that nobody holds or waits on is
/// dropped the next time any lock is acquired.
#[derive(Clone, Default)]
pub struct DocumentLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl DocumentLocks {
    pub async fn acquire(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(document_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked document IDs.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DocumentLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLocks")
            .field("tracked", &self.len())
            .finish()
    }
}

/// Chunks, embeds, and persists documents.
#[derive(Clone)]
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorStore>,
    config: PipelineConfig,
    locks: DocumentLocks,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        documents: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            documents,
            vectors,
            config,
            locks: DocumentLocks::default(),
        }
    }

    /// Create a document and persist its chunks.
    ///
    /// The document row is written only after every chunk is embedded. If
    /// the chunk insert then fails, the row is deleted again so a failed
    /// create never leaves an empty document behind.
    pub async fn create(&self, request: &CreateDocument) -> Result<CreatedDocument, EngineError> {
        let input = request.validate()?;
        let chunks = self.chunk(&input.content)?;
        let vectors = self.embed_all(&chunks).await?;

        let now = chrono::Utc::now().timestamp();
        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: input.tenant_id,
            title: input.title,
            source: input.source,
            created_at: now,
            updated_at: now,
        };
        let records = build_records(&document.tenant_id, &document.id, chunks, vectors);
        tracing::debug!(document_id = %document.id, stage = %Stage::Persisting, chunks = records.len(), "create");

        let commit = CreateCommit {
            documents: self.documents.clone(),
            vectors: self.vectors.clone(),
            timeout: self.config.store_timeout,
            document,
            records,
        };
        tokio::spawn(commit.run())
            .await
            .map_err(|e| EngineError::Aborted(e.to_string()))?
    }

    /// Replace the content of an existing document.
    pub async fn update(&self, request: &UpdateDocument) -> Result<UpdatedDocument, EngineError> {
        let (input, document_id) = request.validate()?;
        self.config.chunker.validate()?;
        let guard = self.lock(&document_id).await;

        self.owned_document(&input.tenant_id, &document_id).await?;

        tracing::debug!(document_id = %document_id, stage = %Stage::Snapshotting, "update");
        let snapshot = store_call(
            Stage::Snapshotting,
            self.config.store_timeout,
            self.vectors.list_chunks(&document_id),
        )
        .await?;

        let chunks = self.chunk(&input.content)?;
        let vectors = self.embed_all(&chunks).await?;
        let records = build_records(&input.tenant_id, &document_id, chunks, vectors);

        let commit = UpdateCommit {
            documents: self.documents.clone(),
            vectors: self.vectors.clone(),
            timeout: self.config.store_timeout,
            document_id,
            title: input.title,
            source: input.source,
            records,
            snapshot,
        };
        tokio::spawn(async move {
            let _guard = guard;
            commit.run().await
        })
        .await
        .map_err(|e| EngineError::Aborted(e.to_string()))?
    }

    /// Delete a document's chunks, then its row.
    ///
    /// If the row delete fails after the chunks are gone, the document is
    /// left empty and the error is returned so the caller can retry.
    pub async fn delete(&self, tenant_id: &str, document_id: &str) -> Result<(), EngineError> {
        let tenant_id = required("tenant_id", tenant_id)?;
        let document_id = required("document_id", document_id)?;
        let guard = self.lock(&document_id).await;

        self.owned_document(&tenant_id, &document_id).await?;

        let documents = self.documents.clone();
        let vectors = self.vectors.clone();
        let timeout = self.config.store_timeout;
        tokio::spawn(async move {
            let _guard = guard;
            tracing::debug!(document_id = %document_id, stage = %Stage::Deleting, "delete");
            store_call(Stage::Deleting, timeout, vectors.delete_chunks(&document_id)).await?;
            if let Err(e) =
                store_call(Stage::Deleting, timeout, documents.delete_document(&document_id)).await
            {
                tracing::warn!(document_id = %document_id, error = %e, "chunks deleted but document row remains");
                return Err(e);
            }
            tracing::info!(document_id = %document_id, "document deleted");
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Aborted(e.to_string()))?
    }

    /// Fetch a document, treating another tenant's document as missing.
    pub async fn owned_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Document, EngineError> {
        tracing::debug!(document_id = %document_id, stage = %Stage::Validating, "ownership check");
        let found = store_call(
            Stage::Validating,
            self.config.store_timeout,
            self.documents.get_document(document_id),
        )
        .await?;
        match found {
            Some(doc) if doc.tenant_id == tenant_id => Ok(doc),
            _ => Err(EngineError::NotFound {
                tenant_id: tenant_id.to_string(),
                document_id: document_id.to_string(),
            }),
        }
    }

    /// Chunks of an owned document, ascending by index.
    pub async fn list_chunks(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChunkRecord>, EngineError> {
        let tenant_id = required("tenant_id", tenant_id)?;
        let document_id = required("document_id", document_id)?;
        self.owned_document(&tenant_id, &document_id).await?;
        store_call(
            Stage::Snapshotting,
            self.config.store_timeout,
            self.vectors.list_chunks(&document_id),
        )
        .await
    }

    async fn lock(&self, document_id: &str) -> Option<OwnedMutexGuard<()>> {
        if self.config.serialize_updates {
            Some(self.locks.acquire(document_id).await)
        } else {
            None
        }
    }

    fn chunk(&self, content: &str) -> Result<Vec<TextChunk>, EngineError> {
        self.config.chunker.validate()?;
        let chunks = self.config.chunker.chunk(content);
        tracing::debug!(stage = %Stage::Chunking, chunks = chunks.len(), "chunked content");
        if chunks.is_empty() {
            return Err(EngineError::Validation(
                "content produced no chunks".to_string(),
            ));
        }
        Ok(chunks)
    }

    /// Embed every chunk, preserving chunk order.
    ///
    /// Chunks are grouped into batches of `embed_batch_size` and up to
    /// `embed_concurrency` batches run at once. The first failure aborts the
    /// whole set.
    async fn embed_all(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>, EngineError> {
        tracing::debug!(stage = %Stage::Embedding, chunks = chunks.len(), model = self.embedder.model_name(), "embedding");
        let timeout = self.config.embed_timeout;
        let embedder = &self.embedder;
        let batches: Vec<Vec<String>> = chunks
            .chunks(self.config.embed_batch_size.max(1))
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| async move {
                let vectors =
                    embed_call(Stage::Embedding, timeout, embedder.embed_batch(&batch)).await?;
                if vectors.len() != batch.len() {
                    return Err(EngineError::embedding(
                        Stage::Embedding,
                        EmbedError::Permanent(format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        )),
                    ));
                }
                Ok(vectors)
            })
            .buffered(self.config.embed_concurrency.max(1))
            .try_collect()
            .await?;

        let expected = self.embedder.dims();
        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EngineError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

fn build_records(
    tenant_id: &str,
    document_id: &str,
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
) -> Vec<ChunkRecord> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| ChunkRecord {
            tenant_id: tenant_id.to_string(),
            document_id: document_id.to_string(),
            chunk_index: chunk.index as i64,
            text: chunk.text,
            vector,
        })
        .collect()
}

struct CreateCommit {
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorStore>,
    timeout: Duration,
    document: Document,
    records: Vec<ChunkRecord>,
}

impl CreateCommit {
    async fn run(self) -> Result<CreatedDocument, EngineError> {
        let id = self.document.id.clone();
        store_call(
            Stage::Persisting,
            self.timeout,
            self.documents.insert_document(&self.document),
        )
        .await?;

        if let Err(e) = store_call(
            Stage::Persisting,
            self.timeout,
            self.vectors.insert_chunks(&self.records),
        )
        .await
        {
            if let Err(cleanup) = store_call(
                Stage::RollingBack,
                self.timeout,
                self.documents.delete_document(&id),
            )
            .await
            {
                tracing::error!(document_id = %id, error = %cleanup, "failed to remove document row after chunk insert failure");
            }
            return Err(e);
        }

        tracing::info!(document_id = %id, chunks = self.records.len(), stage = %Stage::Done, "document created");
        Ok(CreatedDocument {
            document_id: id,
            chunk_count: self.records.len(),
        })
    }
}

struct UpdateCommit {
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorStore>,
    timeout: Duration,
    document_id: String,
    title: String,
    source: String,
    records: Vec<ChunkRecord>,
    snapshot: Vec<ChunkRecord>,
}

impl UpdateCommit {
    async fn run(self) -> Result<UpdatedDocument, EngineError> {
        tracing::debug!(document_id = %self.document_id, stage = %Stage::Deleting, "update");
        if let Err(e) = store_call(
            Stage::Deleting,
            self.timeout,
            self.vectors.delete_chunks(&self.document_id),
        )
        .await
        {
            // A timed-out delete may still have been applied.
            if matches!(e, EngineError::Timeout { .. }) {
                return Err(self.roll_back(e).await);
            }
            return Err(e);
        }

        tracing::debug!(document_id = %self.document_id, stage = %Stage::Persisting, chunks = self.records.len(), "update");
        if let Err(e) = store_call(
            Stage::Persisting,
            self.timeout,
            self.vectors.insert_chunks(&self.records),
        )
        .await
        {
            return Err(self.roll_back(e).await);
        }

        tracing::debug!(document_id = %self.document_id, stage = %Stage::UpdatingMetadata, "update");
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = store_call(
            Stage::UpdatingMetadata,
            self.timeout,
            self.documents
                .update_document_metadata(&self.document_id, &self.title, &self.source, now),
        )
        .await
        {
            // New chunks under the old title; put the old chunks back.
            return Err(self.roll_back(e).await);
        }

        tracing::info!(document_id = %self.document_id, chunks = self.records.len(), stage = %Stage::Done, "document updated");
        Ok(UpdatedDocument {
            chunk_count: self.records.len(),
        })
    }

    async fn roll_back(&self, cause: EngineError) -> EngineError {
        tracing::warn!(document_id = %self.document_id, error = %cause, stage = %Stage::RollingBack, "restoring previous chunks");
        let rollback = restore_snapshot(
            self.vectors.as_ref(),
            self.timeout,
            &self.document_id,
            &self.snapshot,
        )
        .await;
        match &rollback {
            RollbackOutcome::Restored { chunks } => {
                tracing::warn!(document_id = %self.document_id, chunks, "previous chunks restored");
            }
            RollbackOutcome::Failed(e) => {
                tracing::error!(document_id = %self.document_id, error = %e, "rollback failed, document has no chunks");
            }
        }
        EngineError::PartialFailure {
            source: Box::new(cause),
            rollback,
        }
    }
}

/// Put a document's chunks back to `snapshot`.
///
/// Clears whatever is stored for the document first, so a partially
/// applied insert cannot collide with the restored indices.
async fn restore_snapshot(
    vectors: &dyn VectorStore,
    timeout: Duration,
    document_id: &str,
    snapshot: &[ChunkRecord],
) -> RollbackOutcome {
    if let Err(e) = store_call(Stage::RollingBack, timeout, vectors.delete_chunks(document_id)).await
    {
        return RollbackOutcome::Failed(Box::new(e));
    }
    if snapshot.is_empty() {
        return RollbackOutcome::Restored { chunks: 0 };
    }
    match store_call(Stage::RollingBack, timeout, vectors.insert_chunks(snapshot)).await {
        Ok(()) => RollbackOutcome::Restored {
            chunks: snapshot.len(),
        },
        Err(e) => RollbackOutcome::Failed(Box::new(e)),
    }
}
