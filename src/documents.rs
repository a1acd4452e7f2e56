//! Document commands: `create`, `update`, `delete`, `chunks`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use knowledge_engine_core::models::{ChunkRecord, Document};
use knowledge_engine_core::{EngineError, KnowledgeEngine};

use crate::config::Config;
use crate::engine::open_engine;

/// Where a command reads document content from.
pub enum ContentSource<'a> {
    Inline(&'a str),
    File(&'a Path),
}

impl ContentSource<'_> {
    fn read(&self) -> Result<String> {
        match self {
            ContentSource::Inline(text) => Ok(text.to_string()),
            ContentSource::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read content file: {}", path.display())),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChunkListing<'a> {
    id: &'a str,
    title: &'a str,
    source: &'a str,
    created_at: String,
    updated_at: String,
    chunks: Vec<ChunkLine<'a>>,
}

#[derive(Debug, Serialize)]
struct ChunkLine<'a> {
    index: i64,
    dims: usize,
    text: &'a str,
}

pub async fn run_create(
    config: &Config,
    tenant_id: &str,
    title: &str,
    content: ContentSource<'_>,
    source: Option<&str>,
    json: bool,
) -> Result<()> {
    let content = content.read()?;
    let handle = open_engine(config).await?;
    let result = handle
        .engine
        .create_document(tenant_id, title, &content, source)
        .await;
    handle.close().await;
    let created = result.context("create failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!(
            "Created document {} ({} chunks)",
            created.document_id, created.chunk_count
        );
    }
    Ok(())
}

pub async fn run_update(
    config: &Config,
    tenant_id: &str,
    document_id: &str,
    title: &str,
    content: ContentSource<'_>,
    source: Option<&str>,
    json: bool,
) -> Result<()> {
    let content = content.read()?;
    let handle = open_engine(config).await?;
    let result = handle
        .engine
        .update_document(tenant_id, document_id, title, &content, source)
        .await;
    handle.close().await;

    let updated = match result {
        Ok(updated) => updated,
        Err(e) if e.rollback_succeeded() == Some(false) => {
            return Err(anyhow::Error::new(e).context(format!(
                "update failed and document {document_id} has no chunks; re-run the update to repair it"
            )));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("update failed")),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!(
            "Updated document {} ({} chunks)",
            document_id, updated.chunk_count
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, tenant_id: &str, document_id: &str) -> Result<()> {
    let handle = open_engine(config).await?;
    let result = handle.engine.delete_document(tenant_id, document_id).await;
    handle.close().await;
    result.context("delete failed")?;

    println!("Deleted document {}", document_id);
    Ok(())
}

pub async fn run_chunks(config: &Config, tenant_id: &str, document_id: &str, json: bool) -> Result<()> {
    let handle = open_engine(config).await?;
    let result = list(&handle.engine, tenant_id, document_id).await;
    handle.close().await;
    let (doc, chunks) = result.context("chunks failed")?;

    let listing = ChunkListing {
        id: &doc.id,
        title: &doc.title,
        source: &doc.source,
        created_at: format_ts_iso(doc.created_at),
        updated_at: format_ts_iso(doc.updated_at),
        chunks: chunks
            .iter()
            .map(|c| ChunkLine {
                index: c.chunk_index,
                dims: c.vector.len(),
                text: &c.text,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:           {}", listing.id);
    println!("title:        {}", listing.title);
    println!("source:       {}", listing.source);
    println!("created_at:   {}", listing.created_at);
    println!("updated_at:   {}", listing.updated_at);
    println!();
    println!("--- Chunks ({}) ---", listing.chunks.len());
    for chunk in &listing.chunks {
        println!();
        println!("[{}] ({} dims)", chunk.index, chunk.dims);
        println!("{}", chunk.text);
    }
    Ok(())
}

async fn list(
    engine: &KnowledgeEngine,
    tenant_id: &str,
    document_id: &str,
) -> Result<(Document, Vec<ChunkRecord>), EngineError> {
    let doc = engine.get_document(tenant_id, document_id).await?;
    let chunks = engine.list_chunks(tenant_id, document_id).await?;
    Ok((doc, chunks))
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
