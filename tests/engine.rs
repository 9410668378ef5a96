//! Engine-level integration tests with injected fake collaborators.
//!
//! Covers the end-to-end scenarios (plain text search, tabular search,
//! delete then fetch, agentic search with nothing relevant), fallback
//! transparency with a failing or unreachable remote, agentic result
//! deduplication and operation timeouts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use voxrag::config::Config;
use voxrag::error::ErrorKind;
use voxrag::remote::{RemoteCollection, RemoteHit, RemoteRecord, RemoteStoreError};
use voxrag::vision::{DescribeError, Describer, DisabledDescriber};
use voxrag::{EngineDeps, RagEngine};
use voxrag_core::embedding::{Embedder, Embedding};

const DIMS: usize = 512;

/// Hashed bag-of-words embedder: texts sharing words are similar, texts
/// sharing none are (almost) orthogonal.
struct BagOfWordsEmbedder;

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % DIMS as u64) as usize
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Vec<Embedding> {
        texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for w in t
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.len() > 1)
                {
                    v[bucket(w)] += 1.0;
                }
                Embedding::vector(v)
            })
            .collect()
    }
}

struct SlowEmbedder;

#[async_trait]
impl Embedder for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow"
    }

    fn dims(&self) -> usize {
        4
    }

    async fn embed(&self, texts: &[String]) -> Vec<Embedding> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        texts.iter().map(|_| Embedding::degraded(4)).collect()
    }
}

struct CannedDescriber(&'static str);

#[async_trait]
impl Describer for CannedDescriber {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn describe(&self, _bytes: &[u8], _mime: &str, _prompt: &str) -> Result<String, DescribeError> {
        Ok(self.0.to_string())
    }
}

/// Accepts writes, fails every query and delete.
#[derive(Default)]
struct FailingRemote {
    upserts: AtomicUsize,
}

#[async_trait]
impl RemoteCollection for FailingRemote {
    fn name(&self) -> &str {
        "failing"
    }

    async fn create_or_get_collection(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }

    async fn upsert(&self, batch: &[RemoteRecord]) -> Result<(), RemoteStoreError> {
        self.upserts.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, _v: &[f32], _k: usize, _m: bool) -> Result<Vec<RemoteHit>, RemoteStoreError> {
        Err(RemoteStoreError::Api {
            status: 503,
            body: "service unavailable".into(),
        })
    }

    async fn delete_by_ids(&self, _ids: &[String]) -> Result<(), RemoteStoreError> {
        Err(RemoteStoreError::Api {
            status: 503,
            body: "service unavailable".into(),
        })
    }

    async fn delete_all(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }
}

fn unavailable() -> RemoteStoreError {
    RemoteStoreError::Api {
        status: 503,
        body: "down".into(),
    }
}

/// Unreachable from the start: every call fails.
#[derive(Default)]
struct DownRemote {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteCollection for DownRemote {
    fn name(&self) -> &str {
        "down"
    }

    async fn create_or_get_collection(&self) -> Result<(), RemoteStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }

    async fn upsert(&self, _batch: &[RemoteRecord]) -> Result<(), RemoteStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }

    async fn query(&self, _v: &[f32], _k: usize, _m: bool) -> Result<Vec<RemoteHit>, RemoteStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }

    async fn delete_by_ids(&self, _ids: &[String]) -> Result<(), RemoteStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }

    async fn delete_all(&self) -> Result<(), RemoteStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }
}

/// Upserts hang; deleted ids are recorded.
#[derive(Default)]
struct StalledRemote {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteCollection for StalledRemote {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn create_or_get_collection(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }

    async fn upsert(&self, _batch: &[RemoteRecord]) -> Result<(), RemoteStoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn query(&self, _v: &[f32], _k: usize, _m: bool) -> Result<Vec<RemoteHit>, RemoteStoreError> {
        Ok(Vec::new())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), RemoteStoreError> {
        self.deleted.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }
}

async fn engine_with(tmp: &TempDir, deps: EngineDeps) -> RagEngine {
    RagEngine::new(Config::with_data_dir(tmp.path()), deps).await.unwrap()
}

async fn local_engine(tmp: &TempDir) -> RagEngine {
    engine_with(
        tmp,
        EngineDeps {
            embedder: Arc::new(BagOfWordsEmbedder),
            describer: Arc::new(DisabledDescriber),
            remote: None,
        },
    )
    .await
}

fn write_upload(tmp: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let dir = tmp.path().join("incoming");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn ingest(engine: &RagEngine, tmp: &TempDir, name: &str, content: &str) -> String {
    let path = write_upload(tmp, name, content.as_bytes());
    let response = engine.process_document(&path, name, "").await.unwrap();
    assert!(response.success, "ingest failed: {:?}", response);
    response.document_id.unwrap()
}

#[tokio::test]
async fn plain_text_document_is_searchable() {
    let tmp = TempDir::new().unwrap();
    let engine = local_engine(&tmp).await;
    let id = ingest(&engine, &tmp, "warranty.txt", "The warranty is 24 months.").await;

    let response = engine.search_documents("warranty period", 3).await.unwrap();
    assert!(response.success);
    assert_eq!(response.query, "warranty period");
    assert_eq!(response.results_count, response.results.len());
    let hit = response
        .results
        .iter()
        .find(|r| r.document_id == id)
        .expect("warranty document in results");
    assert!(hit.hybrid_score > 0.0);
    assert_eq!(hit.metadata.file_type, "txt");
}

#[tokio::test]
async fn tabular_rows_are_searchable() {
    let tmp = TempDir::new().unwrap();
    let engine = local_engine(&tmp).await;
    ingest(&engine, &tmp, "people.csv", "Name,Age\nAlice,30\nBob,25\n").await;

    let response = engine.search_documents("Bob age", 5).await.unwrap();
    assert!(response.success);
    assert!(
        response.results.iter().any(|r| r.content.contains("Bob: 25")),
        "results: {:?}",
        response.results
    );
}

#[tokio::test]
async fn deleted_document_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let engine = local_engine(&tmp).await;
    let id = ingest(&engine, &tmp, "notes.md", "# Notes\n\nRemember the milk.").await;

    let content = engine.get_document_content(&id).await.unwrap();
    assert!(content.success);
    assert!(content.document.unwrap().content.contains("Remember the milk"));

    let deleted = engine.delete_document(&id).await.unwrap();
    assert!(deleted.success);
    assert!(deleted.warning.is_none());

    let content = engine.get_document_content(&id).await.unwrap();
    assert!(!content.success);
    assert_eq!(content.error_kind, Some(ErrorKind::NotFound));
    assert!(content.error.unwrap().to_lowercase().contains("not found"));

    let again = engine.delete_document(&id).await.unwrap();
    assert!(!again.success);
    assert!(engine.search_documents("milk", 5).await.unwrap().results.is_empty());
}

#[tokio::test]
async fn agentic_search_reports_nothing_relevant() {
    let tmp = TempDir::new().unwrap();
    let engine = local_engine(&tmp).await;
    ingest(&engine, &tmp, "warranty.txt", "The warranty is 24 months.").await;
    ingest(
        &engine,
        &tmp,
        "recipe.txt",
        "Whisk eggs with flour and sugar, then bake for forty minutes.",
    )
    .await;

    let response = engine.agentic_search("55 inch TV dimensions").await.unwrap();
    assert!(!response.success);
    assert!(response.results.is_empty());
    assert!(response.message.contains("No relevant information found"));
    let reasoning = response.reasoning.unwrap();
    let expected = engine
        .config()
        .agentic
        .max_attempts
        .min(reasoning.expanded_queries.len());
    assert_eq!(reasoning.attempts, expected);
    assert!(!reasoning.relevance_passed);
}

#[tokio::test]
async fn agentic_search_answers_with_citations_and_no_duplicates() {
    let tmp = TempDir::new().unwrap();
    let engine = local_engine(&tmp).await;
    let spec_sheet: String = (0..40)
        .map(|i| format!("Model X{} television has a 55 inch screen and dimensions of 123 x 71 cm. ", i))
        .collect();
    let id = ingest(&engine, &tmp, "tv-specs.txt", &spec_sheet).await;
    ingest(&engine, &tmp, "tv-manual.txt", "Mount the TV on a wall. The 55 inch TV weighs 15 kg.").await;

    let response = engine.agentic_search("55 inch TV dimensions").await.unwrap();
    assert!(response.success, "{:?}", response.message);
    assert!(!response.results.is_empty());

    let mut seen = HashSet::new();
    for r in &response.results {
        assert!(
            seen.insert((r.result.document_id.clone(), r.result.chunk_index)),
            "duplicate result {:?}",
            r.result.key()
        );
    }

    let answer = response.answer.unwrap();
    assert!(answer.citations.iter().any(|c| c.document_id == id));
    assert!(answer.text.contains("search attempt"));
    assert!(answer.text.contains("**"));

    let docs = engine.get_all_documents().await.unwrap();
    assert!(docs.iter().any(|d| d.id == id && d.access_count >= 1));
}

#[tokio::test]
async fn failing_remote_falls_back_to_local() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(FailingRemote::default());
    let engine = engine_with(
        &tmp,
        EngineDeps {
            embedder: Arc::new(BagOfWordsEmbedder),
            describer: Arc::new(DisabledDescriber),
            remote: Some(remote.clone()),
        },
    )
    .await;
    let id = ingest(&engine, &tmp, "warranty.txt", "The warranty is 24 months.").await;
    assert!(remote.upserts.load(Ordering::SeqCst) > 0);

    let response = engine.search_documents("warranty", 3).await.unwrap();
    assert!(response.success);
    assert_eq!(response.results[0].document_id, id);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.active_backend, "failing");
    assert!(stats.remote_configured);

    // Remote delete fails: local cleanup proceeds, caller gets a warning.
    let deleted = engine.delete_document(&id).await.unwrap();
    assert!(deleted.success);
    assert!(deleted.warning.is_some());
    assert!(!engine.get_document_content(&id).await.unwrap().success);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_io() {
    let tmp = TempDir::new().unwrap();
    let engine = local_engine(&tmp).await;

    let empty = write_upload(&tmp, "empty.txt", b"");
    let response = engine.process_document(&empty, "empty.txt", "text/plain").await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("File is empty"));
    assert_eq!(response.error_kind, Some(ErrorKind::InputInvalid));
    assert!(empty.exists());

    let missing = engine
        .process_document(Path::new("/definitely/missing.txt"), "missing.txt", "")
        .await
        .unwrap();
    assert_eq!(missing.error_kind, Some(ErrorKind::InputInvalid));

    let search = engine.search_documents("   ", 5).await.unwrap();
    assert!(!search.success);
    assert_eq!(search.error_kind, Some(ErrorKind::InputInvalid));
}

#[tokio::test]
async fn unsupported_and_image_files_still_ingest() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(
        &tmp,
        EngineDeps {
            embedder: Arc::new(BagOfWordsEmbedder),
            describer: Arc::new(CannedDescriber("A red bicycle leaning against a brick wall.")),
            remote: None,
        },
    )
    .await;

    let blob = write_upload(&tmp, "data.bin", &[0u8, 1, 2, 3]);
    let response = engine.process_document(&blob, "data.bin", "").await.unwrap();
    assert!(response.success);
    assert!(response.message.unwrap().contains("placeholder"));

    let image = write_upload(&tmp, "bike.png", &[0x89, b'P', b'N', b'G', 0, 0]);
    let response = engine.process_document(&image, "bike.png", "image/png").await.unwrap();
    assert!(response.success);
    assert_eq!(response.chunk_count, Some(1));

    let search = engine.search_documents("red bicycle", 5).await.unwrap();
    let hit = &search.results[0];
    assert_eq!(hit.file_name, "bike.png");
    assert!(hit.content.contains("Filename: bike.png"));
    assert!(hit.content.contains("Size: 6 bytes"));
}

#[tokio::test]
async fn engine_reloads_chunks_on_restart() {
    let tmp = TempDir::new().unwrap();
    let id = {
        let engine = local_engine(&tmp).await;
        ingest(&engine, &tmp, "warranty.txt", "The warranty is 24 months.").await
    };

    let engine = local_engine(&tmp).await;
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.local_chunks, stats.total_chunks);

    let response = engine.search_documents("warranty", 3).await.unwrap();
    assert_eq!(response.results[0].document_id, id);

    let cleared = engine.clear_all_documents().await.unwrap();
    assert!(cleared.success);
    assert_eq!(engine.stats().await.unwrap().total_documents, 0);
    assert!(engine.get_all_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_operation_times_out_and_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::with_data_dir(tmp.path());
    config.engine.operation_timeout_secs = 1;
    let engine = RagEngine::new(
        config,
        EngineDeps {
            embedder: Arc::new(SlowEmbedder),
            describer: Arc::new(DisabledDescriber),
            remote: None,
        },
    )
    .await
    .unwrap();

    let path = write_upload(&tmp, "slow.txt", b"some text to embed slowly");
    let response = engine.process_document(&path, "slow.txt", "").await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::Timeout));

    assert!(engine.get_all_documents().await.unwrap().is_empty());
    let storage_root = tmp.path().join("uploads");
    let leftovers = std::fs::read_dir(&storage_root)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn unreachable_remote_at_start_runs_local_only() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(DownRemote::default());
    let engine = engine_with(
        &tmp,
        EngineDeps {
            embedder: Arc::new(BagOfWordsEmbedder),
            describer: Arc::new(DisabledDescriber),
            remote: Some(remote.clone()),
        },
    )
    .await;

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.active_backend, "local");
    assert!(!stats.remote_configured);

    let id = ingest(&engine, &tmp, "w.txt", "The warranty is 24 months.").await;
    let response = engine.search_documents("warranty", 3).await.unwrap();
    assert!(response.success);
    assert_eq!(response.results[0].document_id, id);

    let deleted = engine.delete_document(&id).await.unwrap();
    assert!(deleted.success);
    assert!(deleted.warning.is_none());

    // Only the start-up probe reached the remote.
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeout_during_remote_upsert_deletes_remote_chunks() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(StalledRemote::default());
    let mut config = Config::with_data_dir(tmp.path());
    config.engine.operation_timeout_secs = 1;
    let engine = RagEngine::new(
        config,
        EngineDeps {
            embedder: Arc::new(BagOfWordsEmbedder),
            describer: Arc::new(DisabledDescriber),
            remote: Some(remote.clone()),
        },
    )
    .await
    .unwrap();

    let path = write_upload(&tmp, "stalled.txt", b"The warranty is 24 months.");
    let response = engine.process_document(&path, "stalled.txt", "").await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::Timeout));

    let deleted = remote.deleted.lock().unwrap().clone();
    assert_eq!(deleted.len(), 1, "remote ids not removed: {:?}", deleted);
    assert!(deleted[0].ends_with("_chunk_0"));

    assert!(engine.get_all_documents().await.unwrap().is_empty());
    assert_eq!(engine.stats().await.unwrap().local_chunks, 0);
    let leftovers = std::fs::read_dir(tmp.path().join("uploads"))
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}
