//! Overlapping-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size`
//! whitespace-separated tokens. Consecutive chunks share `overlap` tokens,
//! so the window advances by `chunk_size - overlap` each step.
//!
//! Each chunk carries a SHA-256 hash of its text.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

/// Split a document into overlapping token windows.
/// Returns chunks with contiguous indices starting at 0; blank text yields none.
pub fn chunk_document(document: &Document, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let tokens: Vec<&str> = document.text.split_whitespace().collect();
    if tokens.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(tokens.len());
        let text = tokens[start..end].join(" ");
        chunks.push(make_chunk(document, chunks.len(), text));

        if end == tokens.len() {
            break;
        }
        start += stride;
    }

    chunks
}

/// Chunk every document in order, concatenating the results.
pub fn chunk_documents(documents: &[Document], chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, chunk_size, overlap))
        .collect()
}

fn make_chunk(document: &Document, index: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        topic: document.topic.clone(),
        document_id: document.id.clone(),
        chunk_index: index,
        text,
        hash,
    }
}
