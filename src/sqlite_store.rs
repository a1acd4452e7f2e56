//! SQLite-backed [`DocumentStore`] and [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs next to their chunk text,
//! with the vector length in a `dims` column. Search is brute-force cosine
//! similarity over the tenant's rows of matching `dims`; scores are in
//! `[-1.0, 1.0]`, higher is better.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use knowledge_engine_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use knowledge_engine_core::error::StoreError;
use knowledge_engine_core::models::{ChunkRecord, Document, ScoredChunk};
use knowledge_engine_core::store::{DocumentStore, VectorStore};

/// SQLite implementation of the store traits.
pub struct SqliteStore {
    pool: SqlitePool,
    min_score: Option<f32>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            min_score: None,
        }
    }

    /// Drop search hits scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }
}

/// Classify a driver error. Lock contention and pool exhaustion clear up on
/// their own; everything else is treated as permanent.
fn classify(e: sqlx::Error) -> StoreError {
    let transient = match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6"))
                || db.message().contains("database is locked")
        }
        _ => false,
    };
    if transient {
        StoreError::Transient(e.to_string())
    } else {
        StoreError::Permanent(e.to_string())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, tenant_id, title, source, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.tenant_id)
        .bind(&doc.title)
        .bind(&doc.source)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, title, source, created_at, updated_at FROM documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row.map(|r| Document {
            id: r.get("id"),
            tenant_id: r.get("tenant_id"),
            title: r.get("title"),
            source: r.get("source"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        title: &str,
        source: &str,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET title = ?, source = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(source)
        .bind(updated_at)
        .bind(document_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Permanent(format!(
                "document {document_id} does not exist"
            )));
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (tenant_id, document_id, chunk_index, text, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.tenant_id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.vector))
            .bind(chunk.vector.len() as i64)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        // Dropping `tx` on an early return rolls it back.
        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, document_id, chunk_index, text, embedding
            FROM chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkRecord {
                    tenant_id: row.get("tenant_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, chunk_index, text, embedding
            FROM chunks
            WHERE tenant_id = ? AND dims = ?
            "#,
        )
        .bind(tenant_id)
        .bind(query.len() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let mut candidates: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredChunk {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
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
