//! Core data models used throughout lettermill.
//!
//! These types represent the emails, documents, chunks, and retrieval
//! results that flow through the ingestion and answering pipeline.

/// A newsletter email pulled from the mailbox, before it is written to disk.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    /// Provider message id.
    pub message_id: String,
    /// `Subject` header value.
    pub subject: String,
    /// Timestamp substring extracted from the `X-Received` header, if any.
    pub timestamp: Option<String>,
    /// Decoded HTML body.
    pub html: String,
}

/// A raw document loaded from the new-documents directory.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Path relative to the new-documents directory; doubles as source_id.
    pub source_id: String,
    /// Filename stem, used as the document title.
    pub title: String,
    /// File modification time (unix seconds).
    pub modified_at: i64,
    /// Raw HTML content as read from disk.
    pub html: String,
}

/// A chunk of a document's plain-text body.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by the retriever, joined with its document metadata.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity against the query embedding.
    pub score: f64,
    pub title: Option<String>,
    pub source_id: String,
    pub updated_at: i64,
}
