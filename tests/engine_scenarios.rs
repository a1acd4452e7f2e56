//! End-to-end scenarios against the SQLite store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use knowledge_engine::db;
use knowledge_engine::migrate;
use knowledge_engine::sqlite_store::SqliteStore;
use knowledge_engine_core::embedding::HashingEmbedder;
use knowledge_engine_core::engine::{EngineConfig, KnowledgeEngine};
use knowledge_engine_core::error::{EngineError, StoreError};
use knowledge_engine_core::models::{ChunkRecord, Document, ScoredChunk};
use knowledge_engine_core::store::{DocumentStore, VectorStore};

const DIMS: usize = 512;

async fn sqlite_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let pool = db::connect_path(&tmp.path().join("kbe.sqlite")).await.unwrap();
    migrate::migrate(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

async fn engine(tmp: &TempDir) -> KnowledgeEngine {
    KnowledgeEngine::with_store(
        Arc::new(HashingEmbedder::new(DIMS)),
        sqlite_store(tmp).await,
        EngineConfig::default(),
    )
}

/// `n` characters of distinct tokens: `w0000 w0001 ...`.
fn unique_text(n: usize) -> String {
    let mut out = String::new();
    let mut i = 0;
    while out.len() < n {
        out.push_str(&format!("w{i:04} "));
        i += 1;
    }
    out.truncate(n);
    if out.ends_with(' ') {
        out.pop();
        out.push('x');
    }
    out
}

#[tokio::test]
async fn test_create_1850_chars_then_retrieve_middle_chunk() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;

    let created = engine
        .create_document("t1", "Hours", &unique_text(1850), Some("manual"))
        .await
        .unwrap();
    assert_eq!(created.chunk_count, 3);

    let chunks = engine.list_chunks("t1", &created.document_id).await.unwrap();
    let lengths: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
    assert!(lengths[0] <= 900 && lengths[1] <= 900);
    assert!(lengths[2] < 900);

    // Middle of the middle window: outside both overlaps.
    let phrase = &chunks[1].text[300..600];
    let context = engine.retrieve("t1", phrase, Some(1)).await.unwrap();
    assert_eq!(context.len(), 1);
    assert_eq!(context.passages()[0].chunk_index, 1);
    assert_eq!(context.texts()[0], chunks[1].text);
}

#[tokio::test]
async fn test_update_three_chunks_to_one() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;

    let created = engine
        .create_document("t1", "Hours", &unique_text(1850), None)
        .await
        .unwrap();
    let before = engine
        .retrieve("t1", "w0010 w0011 w0012", Some(5))
        .await
        .unwrap();
    assert!(before.texts().iter().any(|t| t.contains("w0010")));

    let updated = engine
        .update_document("t1", &created.document_id, "Hours", "Closed for renovation.", None)
        .await
        .unwrap();
    assert_eq!(updated.chunk_count, 1);

    let chunks = engine.list_chunks("t1", &created.document_id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    let after = engine
        .retrieve("t1", "w0010 w0011 w0012", Some(5))
        .await
        .unwrap();
    assert!(after.texts().iter().all(|t| !t.contains("w00")));
}

#[tokio::test]
async fn test_delete_then_retrieve_is_empty() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;

    let created = engine
        .create_document("t1", "Parking", "Parking is free after six.", None)
        .await
        .unwrap();
    assert!(!engine
        .retrieve("t1", "parking", None)
        .await
        .unwrap()
        .is_empty());

    engine.delete_document("t1", &created.document_id).await.unwrap();
    let context = engine.retrieve("t1", "parking", None).await.unwrap();
    assert!(context.is_empty());
    assert_eq!(context.render(), "");
}

#[tokio::test]
async fn test_tenant_isolation() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;

    engine
        .create_document("a", "A", "The secret word is aardvark.", None)
        .await
        .unwrap();
    engine
        .create_document("b", "B", "The secret word is bumblebee.", None)
        .await
        .unwrap();

    for k in [1, 5, 20] {
        let context = engine.retrieve("a", "bumblebee", Some(k)).await.unwrap();
        assert!(context.texts().iter().all(|t| !t.contains("bumblebee")));
    }
}

#[tokio::test]
async fn test_repeated_update_is_stable() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    let created = engine
        .create_document("t1", "FAQ", "first version", None)
        .await
        .unwrap();
    let content = unique_text(2500);

    let first = engine
        .update_document("t1", &created.document_id, "FAQ", &content, None)
        .await
        .unwrap();
    let r1 = engine.retrieve("t1", "w0200 w0201", Some(3)).await.unwrap();
    let second = engine
        .update_document("t1", &created.document_id, "FAQ", &content, None)
        .await
        .unwrap();
    let r2 = engine.retrieve("t1", "w0200 w0201", Some(3)).await.unwrap();

    assert_eq!(first.chunk_count, second.chunk_count);
    assert_eq!(r1.texts(), r2.texts());
}

#[tokio::test]
async fn test_wrong_tenant_cannot_delete() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    let created = engine
        .create_document("t1", "Hours", "Open at nine.", None)
        .await
        .unwrap();

    let err = engine
        .delete_document("t2", &created.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
    assert_eq!(
        engine
            .list_chunks("t1", &created.document_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

/// SQLite store whose next chunk insert fails once armed.
struct FailingInsert {
    inner: Arc<SqliteStore>,
    armed: AtomicBool,
}

#[async_trait]
impl DocumentStore for FailingInsert {
    async fn insert_document(&self, doc: &Document) -> Result<(), StoreError> {
        self.inner.insert_document(doc).await
    }
    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get_document(id).await
    }
    async fn update_document_metadata(
        &self,
        id: &str,
        title: &str,
        source: &str,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        self.inner
            .update_document_metadata(id, title, source, updated_at)
            .await
    }
    async fn delete_document(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_document(id).await
    }
}

#[async_trait]
impl VectorStore for FailingInsert {
    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Transient("disk full".into()));
        }
        self.inner.insert_chunks(chunks).await
    }
    async fn delete_chunks(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_chunks(id).await
    }
    async fn list_chunks(&self, id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.list_chunks(id).await
    }
    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        self.inner.search(tenant_id, query, k).await
    }
}

#[tokio::test]
async fn test_update_rollback_restores_previous_chunks() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FailingInsert {
        inner: sqlite_store(&tmp).await,
        armed: AtomicBool::new(false),
    });
    let engine = KnowledgeEngine::with_store(
        Arc::new(HashingEmbedder::new(DIMS)),
        store.clone(),
        EngineConfig::default(),
    );

    let created = engine
        .create_document("t1", "Hours", &unique_text(1850), None)
        .await
        .unwrap();
    let before = engine.list_chunks("t1", &created.document_id).await.unwrap();

    store.armed.store(true, Ordering::SeqCst);
    let err = engine
        .update_document("t1", &created.document_id, "New", "replacement text", None)
        .await
        .unwrap_err();

    assert!(err.is_rollback_class());
    assert_eq!(err.rollback_succeeded(), Some(true));
    let after = engine.list_chunks("t1", &created.document_id).await.unwrap();
    assert_eq!(after, before);
    let doc = engine
        .get_document("t1", &created.document_id)
        .await
        .unwrap();
    assert_eq!(doc.title, "Hours");
}
