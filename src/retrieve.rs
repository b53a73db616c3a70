//! Semantic retrieval over the persisted chunk index.
//!
//! Embeds the query, scans every stored vector, ranks by cosine similarity,
//! and returns the top-k chunks joined with their document metadata. The
//! scan is brute force; a personal newsletter archive stays far below the
//! scale where that matters.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingClient};
use crate::models::RetrievedChunk;

/// Return the k nearest chunks to the query by embedding similarity,
/// highest score first.
pub async fn retrieve(
    pool: &SqlitePool,
    embedder: &EmbeddingClient,
    query: &str,
    k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let query_vec = embedder.embed_query(query).await?;

    let rows = sqlx::query(
        r#"
        SELECT cv.chunk_id, cv.embedding,
               c.chunk_index, c.text,
               d.id AS document_id, d.title, d.source_id, d.updated_at
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        JOIN documents d ON d.id = cv.document_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut results: Vec<RetrievedChunk> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let score = embedding::cosine_similarity(&query_vec, &vec) as f64;
            RetrievedChunk {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                score,
                title: row.get("title"),
                source_id: row.get("source_id"),
                updated_at: row.get("updated_at"),
            }
        })
        .collect();

    // Sort: score desc, then chunk id asc (deterministic)
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(k);

    Ok(results)
}

/// CLI entry point for `lmill search`.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("search requires embeddings. Set [embedding] provider in config.");
    }

    let embedder = EmbeddingClient::from_config(&config.embedding)?;
    let pool = db::connect(config).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);

    let results = retrieve(&pool, &embedder, query, k).await?;

    if results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let title_display = result.title.as_deref().unwrap_or("(untitled)");
        let date = chrono::DateTime::from_timestamp(result.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!("{}. [{:.3}] {}", i + 1, result.score, title_display);
        println!("    source: {} (chunk {})", result.source_id, result.chunk_index);
        println!("    updated: {}", date);
        println!("    excerpt: \"{}\"", snippet(&result.text, 240));
        println!();
    }

    pool.close().await;
    Ok(())
}

/// First `max_chars` characters of a chunk, newlines flattened.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    trimmed.chars().take(max_chars).collect()
}
