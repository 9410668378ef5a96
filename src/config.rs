//! TOML configuration.
//!
//! Every section is optional and defaulted, so an empty file (or
//! [`Config::default()`]) yields a local-only engine with embeddings and
//! vision disabled. API keys are never read from the file; see
//! [`OPENAI_API_KEY_ENV`] and [`CHROMA_TOKEN_ENV`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use voxrag_core::chunk::ChunkParams;
use voxrag_core::planner::PlannerConfig;
use voxrag_core::scoring::ScoringWeights;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const CHROMA_TOKEN_ENV: &str = "CHROMA_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vision: VisionConfig,
    pub vector_store: VectorStoreConfig,
    pub scoring: ScoringConfig,
    pub agentic: AgenticConfig,
    pub extract: ExtractConfig,
    pub citation: CitationConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of per-document file storage.
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/uploads"),
            db_path: PathBuf::from("./data/voxrag.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkProfile {
    Small,
    Large,
    Custom,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub profile: ChunkProfile,
    /// Used only with `profile = "custom"`.
    pub max_chunk_size: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            profile: ChunkProfile::Small,
            max_chunk_size: ChunkParams::SMALL.max_chunk_size,
            overlap_chars: ChunkParams::SMALL.overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        match self.profile {
            ChunkProfile::Small => ChunkParams::SMALL,
            ChunkProfile::Large => ChunkParams::LARGE,
            ChunkProfile::Custom => ChunkParams {
                max_chunk_size: self.max_chunk_size,
                overlap_chars: self.overlap_chars,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, `local` or `disabled`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Ollama base URL.
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 3,
            timeout_secs: 30,
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    /// `openai` or `disabled`.
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Local,
    Chroma,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: Backend,
    pub url: String,
    pub collection: String,
    pub upsert_batch_size: usize,
    pub query_timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            url: "http://localhost:8000".to_string(),
            collection: "voxrag_documents".to_string(),
            upsert_batch_size: 100,
            query_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub phrase_boost: f64,
    pub keyword_scale: f64,
    pub degraded_penalty: f64,
    pub min_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let w = ScoringWeights::default();
        Self {
            vector_weight: w.vector_weight,
            keyword_weight: w.keyword_weight,
            phrase_boost: w.phrase_boost,
            keyword_scale: w.keyword_scale,
            degraded_penalty: w.degraded_penalty,
            min_score: w.min_score,
        }
    }
}

impl ScoringConfig {
    pub fn weights(&self) -> ScoringWeights {
        ScoringWeights {
            vector_weight: self.vector_weight,
            keyword_weight: self.keyword_weight,
            phrase_boost: self.phrase_boost,
            keyword_scale: self.keyword_scale,
            degraded_penalty: self.degraded_penalty,
            min_score: self.min_score,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgenticConfig {
    pub max_attempts: usize,
    pub base_limit: usize,
    pub limit_step: usize,
    pub concept_coverage: f64,
    pub min_results: usize,
    pub min_final_results: usize,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        let p = PlannerConfig::default();
        Self {
            max_attempts: p.max_attempts,
            base_limit: p.base_limit,
            limit_step: p.limit_step,
            concept_coverage: p.concept_coverage,
            min_results: p.min_results,
            min_final_results: p.min_final_results,
        }
    }
}

impl AgenticConfig {
    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            max_attempts: self.max_attempts,
            base_limit: self.base_limit,
            limit_step: self.limit_step,
            concept_coverage: self.concept_coverage,
            min_results: self.min_results,
            min_final_results: self.min_final_results,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractConfig {
    /// PDFs with less extractable text than this go through OCR.
    pub min_pdf_text_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_pdf_text_chars: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CitationConfig {
    pub snippet_window: usize,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self { snippet_window: 300 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub operation_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 120,
        }
    }
}

impl Config {
    /// Config rooted in `dir`: storage and database live underneath it.
    pub fn with_data_dir(dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                root: dir.join("uploads"),
                db_path: dir.join("voxrag.sqlite"),
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let params = self.chunking.params();
        if params.max_chunk_size == 0 {
            bail!("chunking.max_chunk_size must be > 0");
        }
        if params.overlap_chars >= params.max_chunk_size {
            bail!("chunking.overlap_chars must be smaller than chunking.max_chunk_size");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.vision.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown vision provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        if self.vector_store.upsert_batch_size == 0 {
            bail!("vector_store.upsert_batch_size must be > 0");
        }
        if self.vector_store.backend == Backend::Chroma && self.vector_store.url.is_empty() {
            bail!("vector_store.url must be set when backend is 'chroma'");
        }

        let s = &self.scoring;
        for (name, v) in [
            ("vector_weight", s.vector_weight),
            ("keyword_weight", s.keyword_weight),
            ("phrase_boost", s.phrase_boost),
            ("keyword_scale", s.keyword_scale),
            ("degraded_penalty", s.degraded_penalty),
            ("min_score", s.min_score),
        ] {
            if !v.is_finite() || v < 0.0 {
                bail!("scoring.{} must be a non-negative number", name);
            }
        }

        if self.agentic.max_attempts == 0 {
            bail!("agentic.max_attempts must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.agentic.concept_coverage) {
            bail!("agentic.concept_coverage must be in [0.0, 1.0]");
        }

        if self.citation.snippet_window == 0 {
            bail!("citation.snippet_window must be > 0");
        }
        if self.engine.operation_timeout_secs == 0 {
            bail!("engine.operation_timeout_secs must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.params(), ChunkParams::SMALL);
        assert_eq!(config.vector_store.backend, Backend::Local);
        assert_eq!(config.scoring.weights(), ScoringWeights::default());
        assert_eq!(config.agentic.planner(), PlannerConfig::default());
        assert_eq!(config.engine.operation_timeout_secs, 120);
    }

    #[test]
    fn test_profiles_and_custom_chunking() {
        let config = parse_config("[chunking]\nprofile = \"large\"\n").unwrap();
        assert_eq!(config.chunking.params(), ChunkParams::LARGE);

        let config = parse_config(
            "[chunking]\nprofile = \"custom\"\nmax_chunk_size = 800\noverlap_chars = 100\n",
        )
        .unwrap();
        assert_eq!(config.chunking.params().max_chunk_size, 800);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse_config("[embedding]\nprovider = \"cohere\"\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config("[agentic]\nmax_attempts = 0\n").is_err());
        assert!(parse_config("[scoring]\nvector_weight = -1.0\n").is_err());
        assert!(parse_config(
            "[chunking]\nprofile = \"custom\"\nmax_chunk_size = 100\noverlap_chars = 100\n"
        )
        .is_err());
        assert!(parse_config("[vector_store]\nbackend = \"pinecone\"\n").is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/voxrag.example.toml")).unwrap();
        assert_eq!(config.vector_store.backend, Backend::Chroma);
        assert_eq!(config.scoring.weights(), ScoringWeights::default());
        assert_eq!(config.agentic.planner(), PlannerConfig::default());
        assert_eq!(config.chunking.params(), ChunkParams::SMALL);
    }

    #[test]
    fn test_full_file() {
        let config = parse_config(
            r#"
[storage]
root = "/tmp/vox/uploads"
db_path = "/tmp/vox/db.sqlite"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
url = "http://localhost:11434"

[vector_store]
backend = "chroma"
collection = "docs"

[scoring]
min_score = 0.2
"#,
        )
        .unwrap();
        assert_eq!(config.embedding.dims, Some(768));
        assert_eq!(config.vector_store.backend, Backend::Chroma);
        assert_eq!(config.vector_store.upsert_batch_size, 100);
        assert!((config.scoring.weights().min_score - 0.2).abs() < 1e-9);
    }
}
