//! Remote-first store with transparent local failover.
//!
//! Writes go to the remote backend (when configured) and every accepted
//! write is mirrored into the local store, so that a query can be answered
//! locally whenever the remote one fails. Callers see the same result shape
//! either way. A remote that cannot be reached at start-up should not be
//! passed as the primary at all.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, SearchResult};

use super::local::LocalVectorStore;
use super::{DeleteReport, VectorStore};

pub struct FallbackStore {
    primary: Option<Arc<dyn VectorStore>>,
    local: Arc<LocalVectorStore>,
}

impl FallbackStore {
    pub fn new(primary: Option<Arc<dyn VectorStore>>, local: Arc<LocalVectorStore>) -> Self {
        Self { primary, local }
    }

    pub fn local_only(local: Arc<LocalVectorStore>) -> Self {
        Self::new(None, local)
    }

    pub fn local(&self) -> &Arc<LocalVectorStore> {
        &self.local
    }

    /// Name of the backend that serves queries first.
    pub fn active_backend(&self) -> &str {
        match &self.primary {
            Some(p) => p.name(),
            None => self.local.name(),
        }
    }

    pub fn has_remote(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl VectorStore for FallbackStore {
    fn name(&self) -> &str {
        self.active_backend()
    }

    /// Primary first; a primary failure aborts before the local mirror is touched.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if let Some(primary) = &self.primary {
            primary.upsert(chunks).await?;
        }
        self.local.upsert(chunks).await
    }

    async fn query(&self, query_text: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if let Some(primary) = &self.primary {
            match primary.query(query_text, top_k).await {
                Ok(results) => return Ok(results),
                Err(e) => {
                    tracing::warn!(
                        backend = primary.name(),
                        error = %e,
                        "remote query failed, falling back to local store"
                    );
                }
            }
        }
        self.local.query(query_text, top_k).await
    }

    /// Deletes from both backends. A remote failure degrades to
    /// [`DeleteReport::Partial`] so local cleanup still happens.
    async fn delete(&self, document_id: &str, chunk_count: usize) -> Result<DeleteReport> {
        let local = self.local.delete(document_id, chunk_count).await?;
        let Some(primary) = &self.primary else {
            return Ok(local);
        };

        match primary.delete(document_id, chunk_count).await {
            Ok(DeleteReport::NotFound) => Ok(local),
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(
                    backend = primary.name(),
                    document_id,
                    error = %e,
                    "remote delete failed"
                );
                let removed = match local {
                    DeleteReport::Complete { removed } | DeleteReport::Partial { removed, .. } => {
                        removed
                    }
                    DeleteReport::NotFound => 0,
                };
                Ok(DeleteReport::Partial {
                    removed,
                    failed: (0..chunk_count)
                        .map(|i| super::chunk_id(document_id, i))
                        .collect(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn delete_all(&self) -> Result<()> {
        self.local.delete_all().await?;
        if let Some(primary) = &self.primary {
            primary.delete_all().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, Embedding};
    use crate::scoring::ScoringWeights;
    use anyhow::bail;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Vec<Embedding> {
            texts
                .iter()
                .map(|_| Embedding::vector(vec![1.0, 0.0]))
                .collect()
        }
    }

    /// Remote that fails queries and deletes, counting upserts.
    struct BrokenRemote {
        upserts: AtomicUsize,
        fail_upsert: bool,
    }

    #[async_trait]
    impl VectorStore for BrokenRemote {
        fn name(&self) -> &str {
            "broken"
        }
        async fn upsert(&self, _chunks: &[Chunk]) -> Result<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_upsert {
                bail!("connection refused");
            }
            Ok(())
        }
        async fn query(&self, _q: &str, _k: usize) -> Result<Vec<SearchResult>> {
            bail!("connection refused")
        }
        async fn delete(&self, _d: &str, _n: usize) -> Result<DeleteReport> {
            bail!("connection refused")
        }
        async fn delete_all(&self) -> Result<()> {
            Ok(())
        }
    }

    fn chunk(doc: &str, idx: usize, text: &str) -> Chunk {
        Chunk {
            document_id: doc.to_string(),
            file_name: format!("{}.txt", doc),
            file_type: "txt".to_string(),
            chunk_index: idx,
            total_chunks: 1,
            text: text.to_string(),
            embedding: Embedding::vector(vec![1.0, 0.0]),
            uploaded_at: Utc::now(),
        }
    }

    fn stores(fail_upsert: bool) -> (FallbackStore, Arc<BrokenRemote>) {
        let local = Arc::new(LocalVectorStore::new(
            Arc::new(ConstEmbedder),
            ScoringWeights::default(),
        ));
        let remote = Arc::new(BrokenRemote {
            upserts: AtomicUsize::new(0),
            fail_upsert,
        });
        (
            FallbackStore::new(Some(remote.clone() as Arc<dyn VectorStore>), local),
            remote,
        )
    }

    #[tokio::test]
    async fn test_query_falls_back_to_local() {
        let (store, remote) = stores(false);
        store
            .upsert(&[chunk("a", 0, "warranty is 24 months")])
            .await
            .unwrap();
        assert_eq!(remote.upserts.load(Ordering::SeqCst), 1);

        let results = store.query("warranty", 5).await.unwrap();
        let direct = store.local().query("warranty", 5).await.unwrap();
        assert_eq!(results, direct);
        assert_eq!(results.len(), 1);
        assert_eq!(store.active_backend(), "broken");
    }

    #[tokio::test]
    async fn test_primary_upsert_failure_skips_local() {
        let (store, _) = stores(true);
        assert!(store.upsert(&[chunk("a", 0, "text")]).await.is_err());
        assert_eq!(store.local().chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_delete_failure_is_partial() {
        let (store, _) = stores(false);
        store
            .upsert(&[chunk("a", 0, "x"), chunk("a", 1, "y")])
            .await
            .unwrap();
        let report = store.delete("a", 2).await.unwrap();
        assert!(report.is_partial());
        assert_eq!(store.local().chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_local_only() {
        let local = Arc::new(LocalVectorStore::new(
            Arc::new(ConstEmbedder),
            ScoringWeights::default(),
        ));
        let store = FallbackStore::local_only(local);
        assert_eq!(store.active_backend(), "local");
        assert!(!store.has_remote());
        store.upsert(&[chunk("a", 0, "x")]).await.unwrap();
        assert_eq!(
            store.delete("a", 1).await.unwrap(),
            DeleteReport::Complete { removed: 1 }
        );
    }
}
