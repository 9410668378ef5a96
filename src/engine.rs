//! The document engine.
//!
//! [`RagEngine`] is an explicitly constructed service owning every piece of
//! ingestion and retrieval state: file storage, the metadata store, the
//! vector store (remote with local fallback) and the query planner. It is
//! `Send + Sync` and meant to be shared behind an `Arc`.
//!
//! Every public operation returns a structured envelope with a `success`
//! flag instead of an error. Only storage-medium failures (database or
//! filesystem) propagate as `Err`. Each operation runs under
//! `engine.operation_timeout_secs`; dropping its future cancels all
//! in-flight sub-calls.
//!
//! ```text
//! upload ─► FileStorage::store ─► Extractor ─► chunk_text ─► Embedder
//!                                                   │
//!                        MetadataStore ◄────────────┴──────► FallbackStore
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use voxrag_core::chunk::chunk_text;
use voxrag_core::citation::{CitationFormatter, FormattedAnswer};
use voxrag_core::embedding::Embedder;
use voxrag_core::models::{format_ts_iso, Chunk, Document, DocumentSummary, SearchResult};
use voxrag_core::planner::{PlannedResult, QueryPlanner, Reasoning};
use voxrag_core::store::fallback::FallbackStore;
use voxrag_core::store::local::LocalVectorStore;
use voxrag_core::store::{DeleteReport, VectorStore};

use crate::config::{Backend, Config};
use crate::embedding::create_embedder;
use crate::error::{EngineError, ErrorKind};
use crate::extract::{file_extension, mime_for_extension, Extractor};
use crate::metadata::MetadataStore;
use crate::remote::{ChromaCollection, RemoteCollection, RemoteVectorStore};
use crate::storage::FileStorage;
use crate::vision::{create_describer, Describer};

/// Default number of results for [`RagEngine::agentic_search`].
pub const DEFAULT_AGENTIC_LIMIT: usize = 5;

/// External collaborators injected into the engine.
pub struct EngineDeps {
    pub embedder: Arc<dyn Embedder>,
    pub describer: Arc<dyn Describer>,
    /// Remote vector collection; `None` runs local-only.
    pub remote: Option<Arc<dyn RemoteCollection>>,
}

impl EngineDeps {
    /// Build the collaborators named by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote: Option<Arc<dyn RemoteCollection>> = match config.vector_store.backend {
            Backend::Local => None,
            Backend::Chroma => Some(Arc::new(ChromaCollection::new(&config.vector_store)?)),
        };
        Ok(Self {
            embedder: create_embedder(&config.embedding)?,
            describer: create_describer(&config.vision)?,
            remote,
        })
    }
}

/// Envelopes that can carry a recovered [`EngineError`].
trait Envelope {
    fn failure(error: &EngineError) -> Self;
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    /// Chunks stored with a degraded embedding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope for ProcessResponse {
    fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            document_id: None,
            file_name: None,
            chunk_count: None,
            degraded_chunks: None,
            message: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub results_count: usize,
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope for SearchResponse {
    fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            query: String::new(),
            results_count: 0,
            results: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgenticResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<PlannedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<FormattedAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope for AgenticResponse {
    fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            results: Vec::new(),
            reasoning: None,
            answer: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentContent {
    pub id: String,
    pub file_name: String,
    pub content: String,
    pub chunk_count: usize,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope for ContentResponse {
    fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            document: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the backend could not remove every chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope for DeleteResponse {
    fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            message: None,
            warning: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope for ClearResponse {
    fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    /// Chunks held by the in-memory fallback table.
    pub local_chunks: usize,
    pub active_backend: String,
    pub remote_configured: bool,
    pub embedding_model: String,
}

pub struct RagEngine {
    config: Config,
    storage: FileStorage,
    metadata: MetadataStore,
    embedder: Arc<dyn Embedder>,
    extractor: Extractor,
    store: FallbackStore,
    planner: QueryPlanner,
    formatter: CitationFormatter,
    timeout: Duration,
}

impl RagEngine {
    /// Open the engine with collaborators built from `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let deps = EngineDeps::from_config(&config)?;
        Self::new(config, deps).await
    }

    /// Open the metadata store, hydrate the local vector table from it and
    /// wire the vector strategy named by the configuration.
    pub async fn new(config: Config, deps: EngineDeps) -> Result<Self> {
        config.validate()?;
        let metadata = MetadataStore::open(&config).await?;
        let weights = config.scoring.weights();

        let local = Arc::new(LocalVectorStore::new(deps.embedder.clone(), weights.clone()));
        let chunks = metadata.load_all_chunks().await?;
        let loaded = chunks.len();
        local.hydrate(chunks);

        let primary: Option<Arc<dyn VectorStore>> = match deps.remote {
            Some(collection) => match collection.create_or_get_collection().await {
                Ok(()) => Some(Arc::new(RemoteVectorStore::new(
                    collection,
                    deps.embedder.clone(),
                    weights,
                    &config.vector_store,
                ))),
                Err(e) => {
                    tracing::warn!(
                        backend = collection.name(),
                        error = %e,
                        "remote collection unavailable at start-up, running local only"
                    );
                    None
                }
            },
            None => None,
        };
        let store = FallbackStore::new(primary, local);

        tracing::info!(
            backend = store.active_backend(),
            chunks = loaded,
            embedding_model = deps.embedder.model_name(),
            "engine ready"
        );

        Ok(Self {
            storage: FileStorage::new(&config.storage.root),
            extractor: Extractor::new(deps.describer, &config.extract),
            planner: QueryPlanner::new(config.agentic.planner()),
            formatter: CitationFormatter::new(config.citation.snippet_window),
            timeout: Duration::from_secs(config.engine.operation_timeout_secs.max(1)),
            embedder: deps.embedder,
            metadata,
            store,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `op` under the operation timeout, turning recoverable failures
    /// into a failure envelope.
    async fn run<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        T: Envelope,
        F: Future<Output = Result<T, EngineError>>,
    {
        let outcome = match tokio::time::timeout(self.timeout, op).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout(self.timeout.as_secs())),
        };
        match outcome {
            Ok(envelope) => Ok(envelope),
            Err(EngineError::Storage(e)) => Err(e),
            Err(e) => {
                tracing::warn!(operation, error = %e, "operation failed");
                Ok(T::failure(&e))
            }
        }
    }

    // ============ Ingestion ============

    /// Ingest the file at `file_path`.
    ///
    /// The file is moved into permanent storage first; if anything after
    /// that fails, the stored copy is removed and the call reports failure.
    pub async fn process_document(
        &self,
        file_path: &Path,
        original_name: &str,
        mime_type: &str,
    ) -> Result<ProcessResponse> {
        let document_id = uuid::Uuid::new_v4().to_string();
        let written = AtomicUsize::new(0);
        let response = self
            .run(
                "process_document",
                self.process_inner(&document_id, &written, file_path, original_name, mime_type),
            )
            .await?;
        if response.error_kind == Some(ErrorKind::Timeout) {
            self.discard(&document_id, written.load(Ordering::SeqCst)).await;
        }
        Ok(response)
    }

    /// Best-effort removal of a document whose ingestion was cancelled.
    /// `written` is the number of chunks handed to the vector store.
    async fn discard(&self, document_id: &str, written: usize) {
        let recorded = match self.metadata.delete(document_id).await {
            Ok(Some(doc)) => doc.chunk_count,
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(document_id, error = %e, "failed to discard metadata");
                0
            }
        };
        let chunk_count = recorded.max(written);
        if let Err(e) = self.store.delete(document_id, chunk_count).await {
            tracing::warn!(document_id, error = %e, "failed to discard chunks");
        }
        if let Err(e) = self.storage.delete(document_id).await {
            tracing::warn!(document_id, error = %e, "failed to discard stored file");
        }
    }

    async fn process_inner(
        &self,
        document_id: &str,
        written: &AtomicUsize,
        file_path: &Path,
        original_name: &str,
        mime_type: &str,
    ) -> Result<ProcessResponse, EngineError> {
        if original_name.trim().is_empty() || file_path.as_os_str().is_empty() {
            return Err(EngineError::InputInvalid(
                "file path and original name are required".into(),
            ));
        }
        let size_bytes = match tokio::fs::metadata(file_path).await {
            Ok(m) if m.is_file() => m.len(),
            _ => {
                return Err(EngineError::InputInvalid(format!(
                    "File not found: {}",
                    file_path.display()
                )))
            }
        };
        if size_bytes == 0 {
            return Err(EngineError::InputInvalid("File is empty".into()));
        }

        let extension = file_extension(original_name);
        let mime_type = if mime_type.trim().is_empty() {
            mime_for_extension(&extension).to_string()
        } else {
            mime_type.to_string()
        };

        let stored_path = self
            .storage
            .store(file_path, document_id, original_name)
            .await?;

        let doc = Document {
            id: document_id.to_string(),
            original_name: original_name.to_string(),
            mime_type,
            file_extension: extension,
            storage_path: stored_path.display().to_string(),
            chunk_count: 0,
            size_bytes,
            uploaded_at: Utc::now(),
            last_accessed_at: None,
            access_count: 0,
        };

        match self.index_document(doc, &stored_path, written).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(document_id).await {
                    tracing::warn!(document_id, error = %cleanup, "failed to remove stored file");
                }
                Err(e)
            }
        }
    }

    async fn index_document(
        &self,
        mut doc: Document,
        stored_path: &Path,
        written: &AtomicUsize,
    ) -> Result<ProcessResponse, EngineError> {
        let extracted = self
            .extractor
            .extract(stored_path, &doc.original_name, &doc.mime_type)
            .await?;

        let texts = match extracted.chunk_override {
            Some(chunks) => chunks,
            None => chunk_text(&extracted.text, self.config.chunking.params()),
        };
        let embeddings = self.embedder.embed(&texts).await;
        if embeddings.len() != texts.len() {
            return Err(EngineError::EmbeddingFailure(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        let degraded = embeddings.iter().filter(|e| e.is_degraded()).count();
        if degraded > 0 {
            tracing::warn!(
                document_id = %doc.id,
                degraded,
                total = texts.len(),
                "chunks stored with degraded embeddings"
            );
        }

        doc.chunk_count = texts.len();
        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| Chunk {
                document_id: doc.id.clone(),
                file_name: doc.original_name.clone(),
                file_type: doc.file_extension.clone(),
                chunk_index: i,
                total_chunks: doc.chunk_count,
                text,
                embedding,
                uploaded_at: doc.uploaded_at,
            })
            .collect();

        // Recorded before the write so a cancelled upsert is still undone.
        written.store(chunks.len(), Ordering::SeqCst);
        if let Err(e) = self.store.upsert(&chunks).await {
            self.undo_upsert(&doc.id, doc.chunk_count).await;
            return Err(EngineError::BackendUnavailable {
                backend: self.store.active_backend().to_string(),
                message: format!("{:#}", e),
            });
        }

        if let Err(e) = self.metadata.insert_document(&doc, &extracted.text, &chunks).await {
            self.undo_upsert(&doc.id, doc.chunk_count).await;
            return Err(e.into());
        }

        tracing::info!(
            document_id = %doc.id,
            file = %doc.original_name,
            chunks = doc.chunk_count,
            placeholder = extracted.degraded,
            "document ingested"
        );

        let mut message = format!(
            "Successfully processed {} into {} chunk{}",
            doc.original_name,
            doc.chunk_count,
            if doc.chunk_count == 1 { "" } else { "s" }
        );
        if extracted.degraded {
            message.push_str(" (content could not be fully extracted; indexed with placeholder text)");
        }

        Ok(ProcessResponse {
            success: true,
            document_id: Some(doc.id),
            file_name: Some(doc.original_name),
            chunk_count: Some(doc.chunk_count),
            degraded_chunks: Some(degraded),
            message: Some(message),
            error: None,
            error_kind: None,
        })
    }

    async fn undo_upsert(&self, document_id: &str, chunk_count: usize) {
        match self.store.delete(document_id, chunk_count).await {
            Ok(report) if report.is_partial() => {
                tracing::warn!(document_id, "vector upsert only partly rolled back")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(document_id, error = %e, "failed to roll back vector upsert"),
        }
    }

    // ============ Retrieval ============

    pub async fn search_documents(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        self.run("search_documents", async {
            let query = query.trim();
            if query.is_empty() {
                return Err(EngineError::InputInvalid("Query is required".into()));
            }
            let results = self
                .store
                .query(query, limit.max(1))
                .await
                .map_err(|e| EngineError::BackendUnavailable {
                    backend: self.store.local().name().to_string(),
                    message: format!("{:#}", e),
                })?;
            self.touch(results.iter().map(|r| r.document_id.as_str())).await;

            tracing::info!(query, results = results.len(), "search");
            Ok(SearchResponse {
                success: true,
                query: query.to_string(),
                results_count: results.len(),
                results,
                error: None,
                error_kind: None,
            })
        })
        .await
    }

    /// Multi-pass retrieval with the default result limit.
    pub async fn agentic_search(&self, query: &str) -> Result<AgenticResponse> {
        self.agentic_search_with_limit(query, DEFAULT_AGENTIC_LIMIT).await
    }

    pub async fn agentic_search_with_limit(&self, query: &str, limit: usize) -> Result<AgenticResponse> {
        self.run("agentic_search", async {
            let query = query.trim();
            if query.is_empty() {
                return Err(EngineError::InputInvalid("Query is required".into()));
            }
            let (results, reasoning) = self.planner.run(&self.store, query, limit).await;

            if results.is_empty() {
                tracing::info!(query, attempts = reasoning.attempts, "agentic search found nothing");
                return Ok(AgenticResponse {
                    success: false,
                    message: format!(
                        "No relevant information found for '{}' after {} search attempt{}.",
                        query,
                        reasoning.attempts,
                        if reasoning.attempts == 1 { "" } else { "s" }
                    ),
                    results,
                    reasoning: Some(reasoning),
                    answer: None,
                    error: None,
                    error_kind: None,
                });
            }

            let answer = self.formatter.format(
                query,
                &reasoning.concepts,
                results.iter().map(|p| &p.result),
                Some(reasoning.attempts),
            );
            self.touch(results.iter().map(|p| p.result.document_id.as_str()))
                .await;

            tracing::info!(
                query,
                attempts = reasoning.attempts,
                results = results.len(),
                relevance_passed = reasoning.relevance_passed,
                "agentic search"
            );
            Ok(AgenticResponse {
                success: true,
                message: answer.text.clone(),
                results,
                reasoning: Some(reasoning),
                answer: Some(answer),
                error: None,
                error_kind: None,
            })
        })
        .await
    }

    /// Bump access statistics; failures are logged only.
    async fn touch<'a>(&self, ids: impl Iterator<Item = &'a str>) {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect();
        if let Err(e) = self.metadata.record_access(&ids).await {
            tracing::warn!(error = %e, "failed to record document access");
        }
    }

    // ============ Documents ============

    pub async fn get_all_documents(&self) -> Result<Vec<DocumentSummary>> {
        let docs = tokio::time::timeout(self.timeout, self.metadata.list())
            .await
            .map_err(|_| EngineError::Timeout(self.timeout.as_secs()))??;
        Ok(docs.iter().map(Document::summary).collect())
    }

    pub async fn get_document_content(&self, document_id: &str) -> Result<ContentResponse> {
        self.run("get_document_content", async {
            if document_id.trim().is_empty() {
                return Err(EngineError::InputInvalid("Document id is required".into()));
            }
            let (doc, content) = self
                .metadata
                .get_with_content(document_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(document_id.to_string()))?;
            self.touch(std::iter::once(document_id)).await;

            Ok(ContentResponse {
                success: true,
                document: Some(DocumentContent {
                    id: doc.id,
                    file_name: doc.original_name,
                    content,
                    chunk_count: doc.chunk_count,
                    uploaded_at: format_ts_iso(&doc.uploaded_at),
                }),
                error: None,
                error_kind: None,
            })
        })
        .await
    }

    /// Remove a document from every backend, the metadata store and file
    /// storage. A partial backend failure is reported as a warning.
    pub async fn delete_document(&self, document_id: &str) -> Result<DeleteResponse> {
        self.run("delete_document", async {
            if document_id.trim().is_empty() {
                return Err(EngineError::InputInvalid("Document id is required".into()));
            }
            let doc = self
                .metadata
                .get(document_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(document_id.to_string()))?;

            let warning = match self.store.delete(&doc.id, doc.chunk_count).await {
                Ok(DeleteReport::Partial { failed, reason, .. }) => {
                    let partial = EngineError::PartialDeleteFailure {
                        backend: self.store.active_backend().to_string(),
                        failed: failed.len(),
                    };
                    tracing::warn!(document_id, reason = %reason, "{}", partial);
                    Some(partial.to_string())
                }
                Ok(_) => None,
                Err(e) => {
                    let partial = EngineError::PartialDeleteFailure {
                        backend: self.store.active_backend().to_string(),
                        failed: doc.chunk_count,
                    };
                    tracing::warn!(document_id, error = %e, "{}", partial);
                    Some(partial.to_string())
                }
            };

            self.metadata.delete(&doc.id).await?;
            self.storage.delete(&doc.id).await?;

            tracing::info!(document_id, file = %doc.original_name, "document deleted");
            Ok(DeleteResponse {
                success: true,
                message: Some(format!("Deleted {}", doc.original_name)),
                warning,
                error: None,
                error_kind: None,
            })
        })
        .await
    }

    pub async fn clear_all_documents(&self) -> Result<ClearResponse> {
        self.run("clear_all_documents", async {
            let mut message = String::new();
            if let Err(e) = self.store.delete_all().await {
                tracing::warn!(error = %e, "vector store clear failed");
                message = format!(" (vector backend not fully cleared: {:#})", e);
            }
            let removed = self.metadata.clear().await?;
            self.storage.clear().await?;

            tracing::info!(removed, "all documents cleared");
            Ok(ClearResponse {
                success: true,
                message: format!(
                    "Cleared {} document{}{}",
                    removed,
                    if removed == 1 { "" } else { "s" },
                    message
                ),
                error: None,
                error_kind: None,
            })
        })
        .await
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let (total_documents, total_chunks) = self.metadata.counts().await?;
        Ok(EngineStats {
            total_documents,
            total_chunks,
            local_chunks: self.store.local().chunk_count(),
            active_backend: self.store.active_backend().to_string(),
            remote_configured: self.store.has_remote(),
            embedding_model: self.embedder.model_name().to_string(),
        })
    }
}
