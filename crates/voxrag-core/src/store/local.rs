//! In-memory brute-force [`VectorStore`].
//!
//! Holds every chunk and its embedding in a `HashMap` behind a
//! `std::sync::RwLock`. A query embeds the query text once, then scores
//! every stored chunk with [`score_chunk`] and returns the top-K qualifying
//! results. The table is hydrated from the metadata store on start-up.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::models::{format_ts_iso, Chunk, ResultMetadata, SearchResult};
use crate::scoring::{rank, score_chunk, ScoringWeights, TermMatcher};

use super::{chunk_id, DeleteReport, VectorStore};

/// Local fallback store: cosine similarity plus keyword overlap.
pub struct LocalVectorStore {
    embedder: Arc<dyn Embedder>,
    weights: ScoringWeights,
    docs: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl LocalVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, weights: ScoringWeights) -> Self {
        Self {
            embedder,
            weights,
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Load previously persisted chunks, replacing any held for the same documents.
    pub fn hydrate(&self, chunks: Vec<Chunk>) {
        let mut grouped: HashMap<String, Vec<Chunk>> = HashMap::new();
        for c in chunks {
            grouped.entry(c.document_id.clone()).or_default().push(c);
        }
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        for (doc_id, mut list) in grouped {
            list.sort_by_key(|c| c.chunk_index);
            docs.insert(doc_id, list);
        }
    }

    pub fn chunk_count(&self) -> usize {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        docs.values().map(Vec::len).sum()
    }

    pub fn document_count(&self) -> usize {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Chunks of one document in index order.
    pub fn chunks_for(&self, document_id: &str) -> Vec<Chunk> {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        for c in chunks {
            let list = docs.entry(c.document_id.clone()).or_default();
            match list.iter_mut().find(|e| e.chunk_index == c.chunk_index) {
                Some(existing) => *existing = c.clone(),
                None => list.push(c.clone()),
            }
            list.sort_by_key(|e| e.chunk_index);
        }
        Ok(())
    }

    async fn query(&self, query_text: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if query_text.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_one(query_text).await;
        let matcher = TermMatcher::for_query(query_text);

        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let results: Vec<SearchResult> = docs
            .values()
            .flatten()
            .filter_map(|c| {
                let s = score_chunk(
                    query_text,
                    &matcher,
                    &query_embedding,
                    &c.embedding,
                    &c.text,
                    &self.weights,
                );
                s.qualifies(&self.weights).then(|| SearchResult {
                    document_id: c.document_id.clone(),
                    file_name: c.file_name.clone(),
                    content: c.text.clone(),
                    chunk_index: c.chunk_index,
                    vector_score: s.vector,
                    keyword_score: s.keyword,
                    hybrid_score: s.hybrid,
                    metadata: ResultMetadata {
                        uploaded_at: format_ts_iso(&c.uploaded_at),
                        file_type: c.file_type.clone(),
                    },
                })
            })
            .collect();

        Ok(rank(results, top_k))
    }

    async fn delete(&self, document_id: &str, chunk_count: usize) -> Result<DeleteReport> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = docs.remove(document_id) else {
            return Ok(DeleteReport::NotFound);
        };

        let missing: Vec<String> = (0..chunk_count)
            .filter(|i| !list.iter().any(|c| c.chunk_index == *i))
            .map(|i| chunk_id(document_id, i))
            .collect();
        if missing.is_empty() {
            Ok(DeleteReport::Complete {
                removed: list.len(),
            })
        } else {
            Ok(DeleteReport::Partial {
                removed: list.len(),
                failed: missing,
                reason: "chunk ids not present in local store".to_string(),
            })
        }
    }

    async fn delete_all(&self) -> Result<()> {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use chrono::Utc;

    /// Bag-of-words embedder: one dimension per known word.
    struct VocabEmbedder {
        vocab: Vec<&'static str>,
    }

    #[async_trait]
    impl Embedder for VocabEmbedder {
        fn model_name(&self) -> &str {
            "vocab"
        }
        fn dims(&self) -> usize {
            self.vocab.len()
        }
        async fn embed(&self, texts: &[String]) -> Vec<Embedding> {
            texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    Embedding::vector(
                        self.vocab
                            .iter()
                            .map(|w| lower.matches(w).count() as f32)
                            .collect(),
                    )
                })
                .collect()
        }
    }

    fn store() -> LocalVectorStore {
        LocalVectorStore::new(
            Arc::new(VocabEmbedder {
                vocab: vec!["warranty", "battery", "screen", "months"],
            }),
            ScoringWeights::default(),
        )
    }

    async fn chunk(store: &LocalVectorStore, doc: &str, idx: usize, text: &str) -> Chunk {
        Chunk {
            document_id: doc.to_string(),
            file_name: format!("{}.txt", doc),
            file_type: "txt".to_string(),
            chunk_index: idx,
            total_chunks: 1,
            text: text.to_string(),
            embedding: store.embedder.embed_one(text).await,
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_query_ranks_matching_chunk_first() {
        let s = store();
        let a = chunk(&s, "a", 0, "The warranty is 24 months.").await;
        let b = chunk(&s, "b", 0, "The battery lasts all day.").await;
        s.upsert(&[a, b]).await.unwrap();

        let results = s.query("warranty period", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "a");
        assert!(results[0].hybrid_score > 0.0);
        assert!(results[0].vector_score > 0.0);
    }

    #[tokio::test]
    async fn test_degraded_chunks_still_match_keywords() {
        let s = store();
        let mut c = chunk(&s, "a", 0, "warranty card enclosed").await;
        c.embedding = Embedding::degraded(4);
        s.upsert(&[c]).await.unwrap();

        let results = s.query("warranty", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vector_score, 0.0);
        assert!(results[0].keyword_score > 0.0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_index() {
        let s = store();
        let first = chunk(&s, "a", 0, "old screen text").await;
        let second = chunk(&s, "a", 0, "new battery text").await;
        s.upsert(&[first]).await.unwrap();
        s.upsert(&[second]).await.unwrap();
        assert_eq!(s.chunk_count(), 1);
        assert_eq!(s.chunks_for("a")[0].text, "new battery text");
    }

    #[tokio::test]
    async fn test_delete_reports() {
        let s = store();
        let c0 = chunk(&s, "a", 0, "warranty").await;
        let c1 = chunk(&s, "a", 1, "battery").await;
        s.upsert(&[c0, c1]).await.unwrap();

        assert_eq!(s.delete("missing", 1).await.unwrap(), DeleteReport::NotFound);
        let report = s.delete("a", 3).await.unwrap();
        assert!(report.is_partial());
        assert_eq!(s.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_hydrate_and_delete_all() {
        let s = store();
        let c1 = chunk(&s, "a", 1, "screen").await;
        let c0 = chunk(&s, "a", 0, "warranty").await;
        s.hydrate(vec![c1, c0]);
        let chunks = s.chunks_for("a");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(s.document_count(), 1);

        s.delete_all().await.unwrap();
        assert_eq!(s.chunk_count(), 0);
    }
}
