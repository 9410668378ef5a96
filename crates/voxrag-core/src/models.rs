//! Core data models shared by ingestion and retrieval.
//!
//! A [`Document`] is the durable bookkeeping record for one uploaded file.
//! Its text is split into [`Chunk`]s, which are the unit of embedding and
//! retrieval. Queries produce [`SearchResult`]s carrying the full score
//! breakdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;

/// Per-document bookkeeping owned by the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub original_name: String,
    pub mime_type: String,
    /// Lower-cased extension without the dot (`"pdf"`, `"csv"`, ...).
    pub file_extension: String,
    pub storage_path: String,
    pub chunk_count: usize,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl Document {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            file_name: self.original_name.clone(),
            mime_type: self.mime_type.clone(),
            file_extension: self.file_extension.clone(),
            chunk_count: self.chunk_count,
            size_bytes: self.size_bytes,
            uploaded_at: format_ts_iso(&self.uploaded_at),
            last_accessed_at: self.last_accessed_at.as_ref().map(format_ts_iso),
            access_count: self.access_count,
        }
    }
}

/// Listing view of a [`Document`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_extension: String,
    pub chunk_count: usize,
    pub size_bytes: u64,
    pub uploaded_at: String,
    pub last_accessed_at: Option<String>,
    pub access_count: u64,
}

/// A bounded slice of a document's text plus its embedding.
///
/// `text` already includes the overlap carried over from the previous chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub embedding: Embedding,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata echoed back with every search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub uploaded_at: String,
    pub file_type: String,
}

/// A scored chunk returned from a vector store query.
///
/// `hybrid_score` is non-negative and non-decreasing in both
/// `vector_score` and `keyword_score`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub file_name: String,
    pub content: String,
    pub chunk_index: usize,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub hybrid_score: f64,
    pub metadata: ResultMetadata,
}

impl SearchResult {
    /// Dedup key used across cascading retrieval attempts.
    pub fn key(&self) -> (String, usize) {
        (self.document_id.clone(), self.chunk_index)
    }
}

/// Format a timestamp as ISO 8601 with second precision.
pub fn format_ts_iso(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
