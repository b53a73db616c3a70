//! Document retrieval by ID.
//!
//! Prints a stored document and its chunks; the companion to the source
//! metadata printed by `ask`/`chat`, so an attribution can be followed back
//! to the full newsletter text.

use anyhow::{bail, Result};
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub struct DocumentView {
    pub id: String,
    pub source: String,
    pub source_id: String,
    pub title: Option<String>,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub body: String,
    pub chunks: Vec<(i64, String)>,
}

pub async fn get_document(config: &Config, id: &str) -> Result<DocumentView> {
    let pool = db::connect(config).await?;

    let doc_row = sqlx::query(
        "SELECT id, source, source_id, title, created_at, updated_at, body FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;

    let doc_row = match doc_row {
        Some(row) => row,
        None => {
            pool.close().await;
            bail!("document not found: {}", id);
        }
    };

    let created_at: i64 = doc_row.get("created_at");
    let updated_at: i64 = doc_row.get("updated_at");

    let chunk_rows = sqlx::query(
        "SELECT chunk_index, text FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let chunks: Vec<(i64, String)> = chunk_rows
        .iter()
        .map(|row| (row.get("chunk_index"), row.get("text")))
        .collect();

    pool.close().await;

    Ok(DocumentView {
        id: doc_row.get("id"),
        source: doc_row.get("source"),
        source_id: doc_row.get("source_id"),
        title: doc_row.get("title"),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
        body: doc_row.get("body"),
        chunks,
    })
}

/// CLI entry point — calls get_document and prints to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let doc = match get_document(config, id).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!(
        "title:      {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    println!("source:     {}", doc.source);
    println!("source_id:  {}", doc.source_id);
    println!("created_at: {}", doc.created_at);
    println!("updated_at: {}", doc.updated_at);
    println!();

    println!("--- Body ---");
    println!("{}", doc.body);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for (index, text) in &doc.chunks {
        println!("[chunk {}]", index);
        println!("{}", text);
        println!();
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
