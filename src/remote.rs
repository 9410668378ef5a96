//! Remote vector backend.
//!
//! [`RemoteCollection`] is the thin wire interface to a hosted vector
//! service; [`ChromaCollection`] implements it over the Chroma REST API.
//! [`RemoteVectorStore`] adapts any collection to the
//! [`VectorStore`] trait: it embeds queries itself, converts the service's
//! distances to similarities and applies the same keyword and phrase
//! scoring as the local strategy, so results from both backends are
//! comparable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use voxrag_core::embedding::{Embedder, Embedding};
use voxrag_core::models::{format_ts_iso, Chunk, ResultMetadata, SearchResult};
use voxrag_core::scoring::{combine, contains_phrase, rank, ScoringWeights, TermMatcher};
use voxrag_core::store::{chunk_id, DeleteReport, VectorStore};

use crate::config::{VectorStoreConfig, CHROMA_TOKEN_ENV};

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("query embedding unavailable")]
    DegradedQuery,
}

/// Per-chunk metadata stored beside the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub uploaded_at: String,
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: RecordMetadata,
}

impl RemoteRecord {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk_id(&chunk.document_id, chunk.chunk_index),
            embedding: chunk.embedding.to_dense(),
            document: chunk.text.clone(),
            metadata: RecordMetadata {
                document_id: chunk.document_id.clone(),
                file_name: chunk.file_name.clone(),
                file_type: chunk.file_type.clone(),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                uploaded_at: format_ts_iso(&chunk.uploaded_at),
                degraded: chunk.embedding.is_degraded(),
            },
        }
    }
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHit {
    pub id: String,
    pub document: String,
    pub metadata: Option<RecordMetadata>,
    /// Service distance; smaller is closer.
    pub distance: f64,
}

/// Wire-level operations of a hosted vector collection.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    fn name(&self) -> &str;

    async fn create_or_get_collection(&self) -> Result<(), RemoteStoreError>;

    async fn upsert(&self, batch: &[RemoteRecord]) -> Result<(), RemoteStoreError>;

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<RemoteHit>, RemoteStoreError>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), RemoteStoreError>;

    async fn delete_all(&self) -> Result<(), RemoteStoreError>;
}

/// Chroma collection over the v1 REST API.
pub struct ChromaCollection {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    token: Option<String>,
    collection_id: tokio::sync::Mutex<Option<String>>,
}

impl ChromaCollection {
    pub fn new(config: &VectorStoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.query_timeout_secs.max(1) * 3))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            token: std::env::var(CHROMA_TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            collection_id: tokio::sync::Mutex::new(None),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}/api/v1{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<serde_json::Value, RemoteStoreError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RemoteStoreError::InvalidResponse(e.to_string()))
    }

    /// Resolve (creating on first use) the collection id.
    async fn collection_id(&self) -> Result<String, RemoteStoreError> {
        let mut cached = self.collection_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }
        let body = serde_json::json!({ "name": self.collection, "get_or_create": true });
        let json = self
            .send(self.request(reqwest::Method::POST, "/collections").json(&body))
            .await?;
        let id = json
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RemoteStoreError::InvalidResponse("collection response without id".into()))?
            .to_string();
        *cached = Some(id.clone());
        Ok(id)
    }
}

/// Parse a Chroma query reply (single query embedding).
pub fn parse_query_response(json: &serde_json::Value) -> Result<Vec<RemoteHit>, RemoteStoreError> {
    let first = |key: &str| -> Option<&Vec<serde_json::Value>> {
        json.get(key)?.as_array()?.first()?.as_array()
    };
    let ids = first("ids").ok_or_else(|| RemoteStoreError::InvalidResponse("missing ids".into()))?;
    let documents = first("documents");
    let metadatas = first("metadatas");
    let distances = first("distances");

    Ok(ids
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let id = id.as_str()?.to_string();
            let document = documents
                .and_then(|d| d.get(i))
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string();
            let metadata = metadatas
                .and_then(|m| m.get(i))
                .and_then(|m| serde_json::from_value(m.clone()).ok());
            let distance = distances
                .and_then(|d| d.get(i))
                .and_then(|d| d.as_f64())
                .unwrap_or(f64::MAX);
            Some(RemoteHit {
                id,
                document,
                metadata,
                distance,
            })
        })
        .collect())
}

#[async_trait]
impl RemoteCollection for ChromaCollection {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn create_or_get_collection(&self) -> Result<(), RemoteStoreError> {
        self.collection_id().await.map(|_| ())
    }

    async fn upsert(&self, batch: &[RemoteRecord]) -> Result<(), RemoteStoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let id = self.collection_id().await?;
        let body = serde_json::json!({
            "ids": batch.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "embeddings": batch.iter().map(|r| &r.embedding).collect::<Vec<_>>(),
            "documents": batch.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": batch.iter().map(|r| &r.metadata).collect::<Vec<_>>(),
        });
        self.send(
            self.request(reqwest::Method::POST, &format!("/collections/{}/upsert", id))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<RemoteHit>, RemoteStoreError> {
        let id = self.collection_id().await?;
        let mut include = vec!["documents", "distances"];
        if include_metadata {
            include.push("metadatas");
        }
        let body = serde_json::json!({
            "query_embeddings": [vector],
            "n_results": top_k,
            "include": include,
        });
        let json = self
            .send(
                self.request(reqwest::Method::POST, &format!("/collections/{}/query", id))
                    .json(&body),
            )
            .await?;
        parse_query_response(&json)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), RemoteStoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let id = self.collection_id().await?;
        self.send(
            self.request(reqwest::Method::POST, &format!("/collections/{}/delete", id))
                .json(&serde_json::json!({ "ids": ids })),
        )
        .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), RemoteStoreError> {
        self.send(self.request(
            reqwest::Method::DELETE,
            &format!("/collections/{}", self.collection),
        ))
        .await?;
        *self.collection_id.lock().await = None;
        self.collection_id().await.map(|_| ())
    }
}

/// Map a service distance to a similarity in `(0, 1]`.
pub fn distance_to_similarity(distance: f64) -> f64 {
    if distance.is_finite() && distance >= 0.0 {
        1.0 / (1.0 + distance)
    } else {
        0.0
    }
}

/// [`VectorStore`] over a [`RemoteCollection`].
pub struct RemoteVectorStore {
    collection: Arc<dyn RemoteCollection>,
    embedder: Arc<dyn Embedder>,
    weights: ScoringWeights,
    upsert_batch_size: usize,
    query_timeout: Duration,
}

impl RemoteVectorStore {
    pub fn new(
        collection: Arc<dyn RemoteCollection>,
        embedder: Arc<dyn Embedder>,
        weights: ScoringWeights,
        config: &VectorStoreConfig,
    ) -> Self {
        Self {
            collection,
            embedder,
            weights,
            upsert_batch_size: config.upsert_batch_size.max(1),
            query_timeout: Duration::from_secs(config.query_timeout_secs.max(1)),
        }
    }

    fn to_result(&self, query: &str, matcher: &TermMatcher, hit: RemoteHit) -> Option<SearchResult> {
        let meta = hit.metadata?;
        let score = combine(
            distance_to_similarity(hit.distance),
            matcher.keyword_score(&hit.document, self.weights.keyword_scale),
            contains_phrase(query, &hit.document),
            meta.degraded,
            &self.weights,
        );
        score.qualifies(&self.weights).then(|| SearchResult {
            document_id: meta.document_id,
            file_name: meta.file_name,
            content: hit.document,
            chunk_index: meta.chunk_index,
            vector_score: score.vector,
            keyword_score: score.keyword,
            hybrid_score: score.hybrid,
            metadata: ResultMetadata {
                uploaded_at: meta.uploaded_at,
                file_type: meta.file_type,
            },
        })
    }
}

#[async_trait]
impl VectorStore for RemoteVectorStore {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn upsert(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        let records: Vec<RemoteRecord> = chunks.iter().map(RemoteRecord::from_chunk).collect();
        for batch in records.chunks(self.upsert_batch_size) {
            self.collection.upsert(batch).await?;
        }
        Ok(())
    }

    async fn query(&self, query_text: &str, top_k: usize) -> anyhow::Result<Vec<SearchResult>> {
        if query_text.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = match self.embedder.embed_one(query_text).await {
            Embedding::Vector { values } => values,
            Embedding::Degraded { .. } => return Err(RemoteStoreError::DegradedQuery.into()),
        };

        // Over-fetch so keyword rescoring can reorder near neighbours.
        let hits = tokio::time::timeout(
            self.query_timeout,
            self.collection.query(&vector, top_k * 2, true),
        )
        .await
        .map_err(|_| RemoteStoreError::Timeout(self.query_timeout))??;

        let matcher = TermMatcher::for_query(query_text);
        let results = hits
            .into_iter()
            .filter_map(|hit| self.to_result(query_text, &matcher, hit))
            .collect();
        Ok(rank(results, top_k))
    }

    async fn delete(&self, document_id: &str, chunk_count: usize) -> anyhow::Result<DeleteReport> {
        if chunk_count == 0 {
            return Ok(DeleteReport::NotFound);
        }
        let ids: Vec<String> = (0..chunk_count).map(|i| chunk_id(document_id, i)).collect();
        self.collection.delete_by_ids(&ids).await?;
        Ok(DeleteReport::Complete { removed: ids.len() })
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        self.collection.delete_all().await?;
        Ok(())
    }
}
