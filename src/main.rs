//! # Knowledge Engine CLI (`kbe`)
//!
//! The `kbe` binary ingests documents for a tenant and retrieves ranked
//! context for queries.
//!
//! ## Usage
//!
//! ```bash
//! kbe --config ./config/kbe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbe init` | Create the SQLite database and run schema migrations |
//! | `kbe create` | Chunk, embed, and store a new document |
//! | `kbe update <id>` | Replace a document's content (rolls back on failure) |
//! | `kbe delete <id>` | Delete a document and its chunks |
//! | `kbe chunks <id>` | Show a document and its stored chunks |
//! | `kbe retrieve "<query>"` | Print the best-matching context block |
//!
//! Logs go to stderr; set `RUST_LOG=debug` to trace pipeline stages.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_engine::documents::{self, ContentSource};
use knowledge_engine::{config, migrate, retrieve};

/// Knowledge Engine CLI: multi-tenant document ingestion and retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbe.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbe",
    about = "Knowledge Engine: chunk, embed, and retrieve tenant documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Document content, inline or from a file.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct ContentArgs {
    /// Document content as a literal string.
    #[arg(long)]
    content: Option<String>,

    /// Read document content from a file.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ContentArgs {
    fn source(&self) -> ContentSource<'_> {
        match (&self.content, &self.file) {
            (Some(text), _) => ContentSource::Inline(text),
            (None, Some(path)) => ContentSource::File(path),
            // clap's group guarantees one of the two.
            (None, None) => ContentSource::Inline(""),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Create a document.
    ///
    /// Prints the new document ID and the number of chunks written.
    Create {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        title: String,

        #[command(flatten)]
        content: ContentArgs,

        /// Free-form origin label. Defaults to `manual`.
        #[arg(long)]
        source: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replace the title and content of an existing document.
    ///
    /// New chunks are embedded before old ones are removed. If storing them
    /// fails, the previous chunks are restored.
    Update {
        /// Document ID.
        id: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        title: String,

        #[command(flatten)]
        content: ContentArgs,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Delete a document and all of its chunks.
    Delete {
        /// Document ID.
        id: String,

        #[arg(long)]
        tenant: String,
    },

    /// Show a document's metadata and stored chunks.
    Chunks {
        /// Document ID.
        id: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        json: bool,
    },

    /// Retrieve context for a query.
    ///
    /// Prints passages best-first, each prefixed with `[Source N]`.
    Retrieve {
        /// The query text.
        query: String,

        #[arg(long)]
        tenant: String,

        /// Number of passages. Defaults to `[retrieval].default_k`.
        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Create {
            tenant,
            title,
            content,
            source,
            json,
        } => {
            documents::run_create(
                &cfg,
                &tenant,
                &title,
                content.source(),
                source.as_deref(),
                json,
            )
            .await?;
        }
        Commands::Update {
            id,
            tenant,
            title,
            content,
            source,
            json,
        } => {
            documents::run_update(
                &cfg,
                &tenant,
                &id,
                &title,
                content.source(),
                source.as_deref(),
                json,
            )
            .await?;
        }
        Commands::Delete { id, tenant } => {
            documents::run_delete(&cfg, &tenant, &id).await?;
        }
        Commands::Chunks { id, tenant, json } => {
            documents::run_chunks(&cfg, &tenant, &id, json).await?;
        }
        Commands::Retrieve {
            query,
            tenant,
            k,
            json,
        } => {
            retrieve::run_retrieve(&cfg, &tenant, &query, k, json).await?;
        }
    }

    Ok(())
}
