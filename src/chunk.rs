//! Fixed-size overlapping text chunker.
//!
//! Splits document body text into [`Chunk`]s of at most `chunk_chars`
//! characters, with `overlap_chars` characters shared between consecutive
//! chunks so context is not lost at segment boundaries. Splitting is purely
//! length-based: no paragraph or sentence awareness.
//!
//! Each chunk receives a UUID, its position within the document, and a
//! SHA-256 hash of its text for staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into fixed-size chunks with overlap.
///
/// Offsets are counted in characters, not bytes, so multi-byte text never
/// splits inside a code point. Returns chunks with contiguous indices
/// starting at 0. Empty or whitespace-only input yields no chunks: an
/// image-only newsletter strips to nothing, and an empty string is not a
/// valid embedding input.
///
/// Callers must guarantee `overlap_chars < chunk_chars` (the config loader
/// enforces this).
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    debug_assert!(overlap_chars < chunk_chars);

    if text.trim().is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let step = chunk_chars - overlap_chars;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    loop {
        let end = (start + chunk_chars).min(total_chars);
        let piece = &text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(document_id, chunk_index, piece));
        chunk_index += 1;

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
