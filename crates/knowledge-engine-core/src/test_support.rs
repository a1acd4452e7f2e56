//! Fault-injecting collaborators shared by the pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::{EmbedError, StoreError};
use crate::models::{ChunkRecord, Document, ScoredChunk};
use crate::store::memory::InMemoryStore;
use crate::store::{DocumentStore, VectorStore};

pub const TEST_DIMS: usize = 256;

/// Wraps an [`InMemoryStore`] and fails the next N calls of selected
/// operations.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_inserts: AtomicUsize,
    pub fail_deletes: AtomicUsize,
    pub fail_doc_deletes: AtomicUsize,
    pub fail_metadata: AtomicUsize,
    pub fail_search: AtomicUsize,
    pub insert_delay: Option<Duration>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_inserts(self, n: usize) -> Self {
        self.fail_inserts.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_deletes(self, n: usize) -> Self {
        self.fail_deletes.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_doc_deletes(self, n: usize) -> Self {
        self.fail_doc_deletes.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_metadata(self, n: usize) -> Self {
        self.fail_metadata.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_search(self, n: usize) -> Self {
        self.fail_search.store(n, Ordering::SeqCst);
        self
    }

    pub fn slow_inserts(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn insert_document(&self, doc: &Document) -> Result<(), StoreError> {
        self.inner.insert_document(doc).await
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get_document(document_id).await
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        title: &str,
        source: &str,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        if take(&self.fail_metadata) {
            return Err(StoreError::Transient("injected metadata failure".into()));
        }
        self.inner
            .update_document_metadata(document_id, title, source, updated_at)
            .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        if take(&self.fail_doc_deletes) {
            return Err(StoreError::Transient("injected document delete failure".into()));
        }
        self.inner.delete_document(document_id).await
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StoreError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if take(&self.fail_inserts) {
            return Err(StoreError::Transient("injected insert failure".into()));
        }
        self.inner.insert_chunks(chunks).await
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<(), StoreError> {
        if take(&self.fail_deletes) {
            return Err(StoreError::Permanent("injected delete failure".into()));
        }
        self.inner.delete_chunks(document_id).await
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.list_chunks(document_id).await
    }

    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if take(&self.fail_search) {
            return Err(StoreError::Transient("injected search failure".into()));
        }
        self.inner.search(tenant_id, query, k).await
    }
}

/// Hashing embedder that can fail, stall, or answer with the wrong width.
pub struct ScriptedEmbedder {
    inner: HashingEmbedder,
    /// Calls succeed while this is non-zero; afterwards every call fails.
    pub succeed_calls: AtomicUsize,
    pub failure: Option<EmbedError>,
    pub delay: Option<Duration>,
    pub override_dims: Option<usize>,
    pub calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn healthy() -> Self {
        Self {
            inner: HashingEmbedder::new(TEST_DIMS),
            succeed_calls: AtomicUsize::new(usize::MAX),
            failure: None,
            delay: None,
            override_dims: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(calls: usize, failure: EmbedError) -> Self {
        Self {
            succeed_calls: AtomicUsize::new(calls),
            failure: Some(failure),
            ..Self::healthy()
        }
    }

    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::healthy()
        }
    }

    pub fn wrong_width(actual: usize) -> Self {
        Self {
            override_dims: Some(actual),
            ..Self::healthy()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dims(&self) -> usize {
        TEST_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            if !take(&self.succeed_calls) {
                return Err(failure.clone());
            }
        }
        let mut vector = self.inner.embed(text).await?;
        if let Some(dims) = self.override_dims {
            vector.resize(dims, 0.0);
        }
        Ok(vector)
    }
}

pub fn flaky(store: FlakyStore) -> Arc<FlakyStore> {
    Arc::new(store)
}

/// `n` characters of distinct, space-separated tokens (`w0000 w0001 …`).
pub fn unique_text(n: usize) -> String {
    let mut out = String::with_capacity(n + 6);
    let mut i = 0;
    while out.len() < n {
        out.push_str(&format!("w{i:04} "));
        i += 1;
    }
    out.truncate(n);
    // Keep the final character non-blank so the trimmed length stays `n`.
    if out.ends_with(' ') {
        out.pop();
        out.push('x');
    }
    out
}
