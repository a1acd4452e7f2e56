//! The `retrieve` command.
//!
//! Prints the rendered context block (`[Source N]` markers) on stdout. An
//! empty result prints a fixed notice so scripts can tell "nothing
//! relevant" apart from a failure, which exits non-zero.

use anyhow::{Context, Result};

use knowledge_engine_core::retrieve::ContextBlock;

use crate::config::Config;
use crate::engine::open_engine;

pub const EMPTY_NOTICE: &str = "No relevant context found.";

pub async fn retrieve(
    config: &Config,
    tenant_id: &str,
    query: &str,
    k: Option<usize>,
) -> Result<ContextBlock> {
    let handle = open_engine(config).await?;
    let result = handle.engine.retrieve(tenant_id, query, k).await;
    handle.close().await;
    result.context("retrieval failed")
}

pub async fn run_retrieve(
    config: &Config,
    tenant_id: &str,
    query: &str,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let block = retrieve(config, tenant_id, query, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&block)?);
    } else if block.is_empty() {
        println!("{}", EMPTY_NOTICE);
    } else {
        println!("{}", block.render());
    }
    Ok(())
}
