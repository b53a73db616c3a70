//! # lettermill CLI (`lmill`)
//!
//! The `lmill` binary drives the newsletter pipeline: database setup, mail
//! fetching, archiving, indexing, retrieval, and the question-answering
//! interface.
//!
//! ## Usage
//!
//! ```bash
//! lmill --config ./config/lettermill.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lmill init` | Create the SQLite database and run schema migrations |
//! | `lmill fetch` | Download newsletters from the mailbox label |
//! | `lmill archive` | Move already-indexed mail to the archive directory |
//! | `lmill sync` | Strip, chunk, embed, and index new mail |
//! | `lmill run` | One full daily job: archive → fetch → sync |
//! | `lmill schedule` | Block and run the daily job at the configured time |
//! | `lmill search "<query>"` | Top-k semantic retrieval |
//! | `lmill ask "<question>"` | Single-shot retrieval-augmented answer |
//! | `lmill chat` | Multi-turn session with chat history |
//! | `lmill get <id>` | Print a stored document and its chunks |
//! | `lmill embed pending` | Backfill missing or stale embeddings |
//! | `lmill embed rebuild` | Delete and regenerate all embeddings |

mod answer;
mod archive;
mod chunk;
mod config;
mod db;
mod embed_cmd;
mod embedding;
mod get;
mod html;
mod ingest;
mod job;
mod llm;
mod mail;
mod migrate;
mod models;
mod retrieve;
mod schedule;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lettermill — newsletter mailbox ingestion and retrieval-augmented Q&A.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the mailbox, directory, chunking, embedding, and LLM settings.
#[derive(Parser)]
#[command(
    name = "lmill",
    about = "lettermill — newsletter mailbox ingestion and retrieval-augmented Q&A",
    version,
    long_about = "lettermill pulls newsletter emails from a Gmail label, archives the raw HTML, \
    chunks and embeds the text into a SQLite-backed similarity index, and answers questions \
    about the archive through an LLM that retrieves relevant chunks before generating."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lettermill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, embeddings, chunk_vectors). Idempotent.
    Init,

    /// Download newsletter emails from the mailbox label.
    ///
    /// Saves each message's HTML body to the new-documents directory.
    /// Messages are deleted from the mailbox only after their file is
    /// durably on disk (and only when mail.delete_after_fetch is set).
    Fetch,

    /// Move files from the new-documents directory to the archive.
    ///
    /// Run before a fresh fetch so already-indexed mail is not
    /// re-processed by the next sync.
    Archive,

    /// Index new mail: strip HTML, chunk, embed, store.
    Sync {
        /// Dry run — show file and chunk counts without writing.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run the full daily job once: archive → fetch → sync.
    Run,

    /// Block the process and run the daily job at the configured time.
    Schedule,

    /// Top-k semantic retrieval over the index.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to retrieval.top_k).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a single question with retrieved newsletter context.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start a multi-turn question-answering session.
    ///
    /// Maintains chat history for the session; follow-up questions are
    /// rephrased into standalone questions before retrieval. Type `exit`
    /// to end the session.
    Chat,

    /// Print a stored document and its chunks by UUID.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild {
        /// Override the batch size from config (texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Fetch => {
            mail::run_fetch(&cfg).await?;
        }
        Commands::Archive => {
            archive::run_archive(&cfg)?;
        }
        Commands::Sync { dry_run, limit } => {
            ingest::run_sync(&cfg, dry_run, limit).await?;
        }
        Commands::Run => {
            job::run_daily_job(&cfg).await?;
        }
        Commands::Schedule => {
            schedule::run_scheduler(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            retrieve::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { question } => {
            answer::run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            answer::run_chat(&cfg).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
    }

    Ok(())
}
