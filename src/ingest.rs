//! Indexing pipeline orchestration.
//!
//! Coordinates the sync flow: load archived-able email files → strip HTML →
//! chunk → store → embed. Re-syncing an unarchived file replaces its rows
//! (documents are keyed by source + source_id) rather than duplicating them;
//! the archiver is what keeps already-indexed mail out of the next run.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::db;
use crate::embed_cmd;
use crate::embedding::EmbeddingClient;
use crate::html::html_to_text;
use crate::models::{Chunk, LoadedDocument};

/// Source tag for documents that came out of the mailbox pipeline.
pub const MAILBOX_SOURCE: &str = "mailbox";

pub async fn run_sync(config: &Config, dry_run: bool, limit: Option<usize>) -> Result<()> {
    let mut docs = load_new_documents(config)?;

    if let Some(lim) = limit {
        docs.truncate(lim);
    }

    if dry_run {
        println!("sync (dry-run)");
        println!("  files found: {}", docs.len());
        let total_chunks: usize = docs
            .iter()
            .map(|doc| {
                let text = html_to_text(&doc.html);
                chunk_text(
                    "tmp",
                    &text,
                    config.chunking.chunk_chars,
                    config.chunking.overlap_chars,
                )
                .len()
            })
            .sum();
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let pool = db::connect(config).await?;

    let embedder = if config.embedding.is_enabled() {
        match EmbeddingClient::from_config(&config.embedding) {
            Ok(client) => Some(client),
            Err(e) => {
                eprintln!("Warning: embedding disabled for this run: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut docs_upserted = 0u64;
    let mut chunks_written = 0u64;
    let mut embeddings_written = 0u64;
    let mut embeddings_pending = 0u64;

    for doc in &docs {
        let text = html_to_text(&doc.html);
        let doc_id = upsert_document(&pool, doc, &text).await?;
        let chunks = chunk_text(
            &doc_id,
            &text,
            config.chunking.chunk_chars,
            config.chunking.overlap_chars,
        );
        let chunk_count = chunks.len() as u64;
        replace_chunks(&pool, &doc_id, &chunks).await?;

        // Inline embedding (non-fatal); failed batches stay pending for
        // `embed pending`.
        if let Some(ref client) = embedder {
            let (emb_ok, emb_pending) =
                embed_cmd::embed_chunks_inline(client, &pool, &chunks, config.embedding.batch_size)
                    .await;
            embeddings_written += emb_ok;
            embeddings_pending += emb_pending;
        } else {
            embeddings_pending += chunk_count;
        }

        docs_upserted += 1;
        chunks_written += chunk_count;
    }

    println!("sync");
    println!("  files loaded: {}", docs.len());
    println!("  upserted documents: {}", docs_upserted);
    println!("  chunks written: {}", chunks_written);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", embeddings_written);
        println!("  embeddings pending: {}", embeddings_pending);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Load every HTML file from the new-documents directory, sorted by
/// relative path for deterministic ordering.
pub fn load_new_documents(config: &Config) -> Result<Vec<LoadedDocument>> {
    let root = &config.dirs.new_dir;
    if !root.exists() {
        return Ok(Vec::new());
    }

    let include_set = build_globset(&["**/*.html".to_string(), "**/*.htm".to_string()])?;
    let mut docs = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if !include_set.is_match(&rel_str) {
            continue;
        }

        let metadata = std::fs::metadata(path)?;
        let modified = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let modified_at = modified
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let title = path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        docs.push(LoadedDocument {
            source_id: rel_str,
            title,
            modified_at,
            html,
        });
    }

    docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

async fn upsert_document(pool: &SqlitePool, doc: &LoadedDocument, body: &str) -> Result<String> {
    // Compute dedup hash
    let mut hasher = Sha256::new();
    hasher.update(MAILBOX_SOURCE.as_bytes());
    hasher.update(doc.source_id.as_bytes());
    hasher.update(doc.modified_at.to_le_bytes());
    hasher.update(body.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    // Check if document exists
    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE source = ? AND source_id = ?")
            .bind(MAILBOX_SOURCE)
            .bind(&doc.source_id)
            .fetch_optional(pool)
            .await?;

    let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    sqlx::query(
        r#"
        INSERT INTO documents (id, source, source_id, title, created_at, updated_at, body, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, source_id) DO UPDATE SET
            title = excluded.title,
            updated_at = excluded.updated_at,
            body = excluded.body,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&doc_id)
    .bind(MAILBOX_SOURCE)
    .bind(&doc.source_id)
    .bind(&doc.title)
    .bind(doc.modified_at)
    .bind(doc.modified_at)
    .bind(body)
    .bind(&dedup_hash)
    .execute(pool)
    .await?;

    Ok(doc_id)
}

async fn replace_chunks(pool: &SqlitePool, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    // Delete old embeddings for this document's chunks
    sqlx::query(
        "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
    )
    .bind(document_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
    )
    .bind(document_id)
    .execute(&mut *tx)
    .await?;

    // Delete old chunks
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    // Insert new chunks
    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
