//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the single interface the engine uses to
//! store and query chunks, whichever backend is active:
//!
//! | Strategy | Module | Notes |
//! |----------|--------|-------|
//! | Local brute force | [`local`] | cosine + keyword + phrase over an in-memory table |
//! | Remote service | `voxrag::remote` | Chroma-compatible REST collection |
//! | Failover | [`fallback`] | remote first, local on any query failure |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod fallback;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, SearchResult};

/// Backend id of chunk `index` of `document_id`.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", document_id, index)
}

/// Outcome of deleting one document's chunks from a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteReport {
    /// Every chunk id was removed.
    Complete { removed: usize },
    /// Some ids could not be removed; local cleanup may still proceed.
    Partial {
        removed: usize,
        failed: Vec<String>,
        reason: String,
    },
    /// The backend held no chunks for the document.
    NotFound,
}

impl DeleteReport {
    pub fn is_partial(&self) -> bool {
        matches!(self, DeleteReport::Partial { .. })
    }
}

/// Uniform store/query/delete interface over chunk embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or replace chunks (keyed by document id + index) |
/// | [`query`](VectorStore::query) | Embed the query text and return the top-K scored chunks |
/// | [`delete`](VectorStore::delete) | Remove all `chunk_count` chunks of a document |
/// | [`delete_all`](VectorStore::delete_all) | Remove everything |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and stats (`"local"`, `"chroma"`).
    fn name(&self) -> &str;

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    async fn query(&self, query_text: &str, top_k: usize) -> Result<Vec<SearchResult>>;

    async fn delete(&self, document_id: &str, chunk_count: usize) -> Result<DeleteReport>;

    async fn delete_all(&self) -> Result<()>;
}
