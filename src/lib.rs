//! # lettermill
//!
//! A newsletter mailbox ingestion and retrieval-augmented Q&A pipeline.
//!
//! lettermill pulls newsletter emails from a Gmail label, archives the raw
//! HTML on disk, chunks and embeds the text into a SQLite-backed similarity
//! index, and answers questions about the archive through an LLM that
//! retrieves relevant chunks before generating.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Gmail    │──▶│ new-docs │──▶│   Pipeline    │──▶│  SQLite   │
//! │  label    │   │  (HTML)  │   │ Strip+Chunk  │   │ +Vectors  │
//! └──────────┘   └────┬─────┘   │   +Embed     │   └────┬─────┘
//!                     │         └──────────────┘        │
//!                ┌────▼─────┐                     ┌─────▼─────┐
//!                │ archive  │                     │ ask / chat │
//!                │  (moved) │                     │ (LLM+RAG) │
//!                └──────────┘                     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lmill init                 # create database
//! lmill fetch                # download newsletters, empty the label
//! lmill sync                 # strip, chunk, embed, index
//! lmill search "ai funding"  # raw retrieval
//! lmill ask "what changed in the EU AI act?"
//! lmill chat                 # multi-turn session
//! lmill schedule             # daily archive → fetch → sync loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`mail`] | Gmail fetcher (download, then delete-after-save) |
//! | [`archive`] | Moves indexed mail out of the new-documents dir |
//! | [`html`] | HTML-to-text stripping |
//! | [`chunk`] | Fixed-size overlapping chunker |
//! | [`ingest`] | Sync pipeline: load → strip → chunk → store → embed |
//! | [`embedding`] | OpenAI embeddings client + vector utilities |
//! | [`embed_cmd`] | Embedding backfill/rebuild commands |
//! | [`retrieve`] | Top-k semantic retrieval |
//! | [`llm`] | OpenAI chat-completions client |
//! | [`answer`] | Single-shot and conversational answering |
//! | [`job`] | The daily archive → fetch → sync job |
//! | [`schedule`] | Blocking daily scheduler |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod archive;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod html;
pub mod ingest;
pub mod job;
pub mod llm;
pub mod mail;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod schedule;
