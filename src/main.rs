//! # voxrag CLI
//!
//! Thin command-line front end over [`voxrag::RagEngine`]. Every command
//! prints the engine's JSON envelope on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! voxrag --config ./config/voxrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `voxrag init` | Create the database and storage directories |
//! | `voxrag ingest <file>` | Extract, chunk, embed and index a file |
//! | `voxrag search "<query>"` | Single-pass hybrid search |
//! | `voxrag ask "<query>"` | Agentic multi-pass search with a cited answer |
//! | `voxrag list` | List indexed documents |
//! | `voxrag get <id>` | Print a document's extracted text |
//! | `voxrag delete <id>` | Remove a document everywhere |
//! | `voxrag clear` | Remove every document |
//! | `voxrag stats` | Document and chunk totals |

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use voxrag::config::{self, Config};
use voxrag::{logging, RagEngine};

const DEFAULT_CONFIG_PATH: &str = "./config/voxrag.toml";

/// voxrag: document retrieval for voice assistants.
///
/// All commands accept `--config` pointing to a TOML file. When the
/// default path does not exist, built-in defaults are used (local store,
/// embeddings and vision disabled).
#[derive(Parser)]
#[command(name = "voxrag", version, about = "Document ingestion and retrieval for voice assistants")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging for voxrag crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the metadata database and storage root. Idempotent.
    Init,

    /// Ingest a file. The file is moved into managed storage.
    Ingest {
        file: PathBuf,

        /// Name to record instead of the file's own name.
        #[arg(long)]
        name: Option<String>,

        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },

    /// Hybrid search over indexed chunks.
    Search {
        query: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Agentic search: expand, cascade, rerank and cite.
    Ask {
        query: String,

        #[arg(long, default_value_t = voxrag::engine::DEFAULT_AGENTIC_LIMIT)]
        limit: usize,
    },

    /// List indexed documents, newest first.
    List,

    /// Print a document's extracted content.
    Get { id: String },

    /// Delete a document from every backend and from storage.
    Delete { id: String },

    /// Delete every document.
    Clear,

    /// Show totals and the active backend.
    Stats,
}

fn resolve_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = resolve_config(&cli.config)?;

    if let Commands::Init = cli.command {
        std::fs::create_dir_all(&cfg.storage.root)?;
        let store = voxrag::metadata::MetadataStore::open(&cfg).await?;
        store.pool().close().await;
        println!("Initialized database at {}", cfg.storage.db_path.display());
        return Ok(());
    }

    let engine = RagEngine::open(cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Ingest { file, name, mime } => {
            let name = match name {
                Some(n) => n,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let response = engine
                .process_document(&file, &name, mime.as_deref().unwrap_or_default())
                .await?;
            print_json(&response)?;
        }
        Commands::Search { query, limit } => {
            print_json(&engine.search_documents(&query, limit).await?)?;
        }
        Commands::Ask { query, limit } => {
            print_json(&engine.agentic_search_with_limit(&query, limit).await?)?;
        }
        Commands::List => print_json(&engine.get_all_documents().await?)?,
        Commands::Get { id } => print_json(&engine.get_document_content(&id).await?)?,
        Commands::Delete { id } => print_json(&engine.delete_document(&id).await?)?,
        Commands::Clear => print_json(&engine.clear_all_documents().await?)?,
        Commands::Stats => print_json(&engine.stats().await?)?,
    }

    Ok(())
}
