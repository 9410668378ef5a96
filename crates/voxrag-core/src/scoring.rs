//! Hybrid scoring: vector similarity + keyword frequency + exact phrase.
//!
//! # Formula
//!
//! ```text
//! vector  = max(0, cosine(query, chunk))          (0 when either is degraded)
//! keyword = min(1, Σ_t (matches_t / words × scale) / |terms|)
//! phrase  = phrase_boost if the query occurs verbatim (case-insensitive)
//! hybrid  = max(0, w_v × vector + w_k × keyword + phrase − degraded_penalty)
//! ```
//!
//! Query terms are the lower-cased alphanumeric tokens longer than one
//! character; matches are counted with a case-insensitive word-boundary
//! regex. The weights are heuristic defaults and are configurable.

use std::cmp::Ordering;

use regex::Regex;

use crate::embedding::{embedding_similarity, Embedding};
use crate::models::SearchResult;

/// Tunable weights of the hybrid score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub phrase_boost: f64,
    /// Multiplier applied to each term's frequency before normalization.
    pub keyword_scale: f64,
    /// Subtracted from chunks whose embedding is degraded.
    pub degraded_penalty: f64,
    /// Results without any keyword hit must reach this hybrid score.
    pub min_score: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            vector_weight: 0.6,
            keyword_weight: 0.3,
            phrase_boost: 0.4,
            keyword_scale: 10.0,
            degraded_penalty: 0.0,
            min_score: 0.15,
        }
    }
}

/// Score components for one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub vector: f64,
    pub keyword: f64,
    pub phrase: f64,
    pub hybrid: f64,
}

impl ScoreBreakdown {
    /// Whether this chunk should be returned at all.
    pub fn qualifies(&self, weights: &ScoringWeights) -> bool {
        self.keyword > 0.0 || self.phrase > 0.0 || self.hybrid >= weights.min_score
    }
}

/// Extract scoring terms from a query: lower-cased, alphanumeric, length > 1,
/// deduplicated in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
    {
        if !terms.iter().any(|t| t == token) {
            terms.push(token.to_string());
        }
    }
    terms
}

/// Pre-compiled word-boundary matchers for a set of terms.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    terms: Vec<(String, Regex)>,
}

impl TermMatcher {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        let terms = terms
            .iter()
            .filter_map(|t| {
                let t = t.as_ref();
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t)))
                    .ok()
                    .map(|re| (t.to_string(), re))
            })
            .collect();
        Self { terms }
    }

    pub fn for_query(query: &str) -> Self {
        Self::new(&query_terms(query))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(t, _)| t.as_str())
    }

    /// Occurrence count of every term in `text`, in term order.
    pub fn counts(&self, text: &str) -> Vec<usize> {
        self.terms
            .iter()
            .map(|(_, re)| re.find_iter(text).count())
            .collect()
    }

    /// Number of distinct terms occurring at least once.
    pub fn matched_terms(&self, text: &str) -> usize {
        self.terms.iter().filter(|(_, re)| re.is_match(text)).count()
    }

    /// Normalized term-frequency score in `[0, 1]`.
    pub fn keyword_score(&self, text: &str, scale: f64) -> f64 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let words = text.split_whitespace().count().max(1) as f64;
        let sum: f64 = self
            .counts(text)
            .iter()
            .map(|&c| c as f64 / words * scale)
            .sum();
        (sum / self.terms.len() as f64).min(1.0)
    }
}

/// Whether the whole query occurs verbatim in `text`, ignoring case.
pub fn contains_phrase(query: &str, text: &str) -> bool {
    let q = query.trim().to_lowercase();
    !q.is_empty() && text.to_lowercase().contains(&q)
}

/// Combine the three signals into a [`ScoreBreakdown`].
pub fn combine(
    vector: f64,
    keyword: f64,
    phrase_hit: bool,
    degraded: bool,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    let vector = vector.clamp(0.0, 1.0);
    let keyword = keyword.clamp(0.0, 1.0);
    let phrase = if phrase_hit { weights.phrase_boost } else { 0.0 };
    let penalty = if degraded { weights.degraded_penalty } else { 0.0 };
    let hybrid =
        (weights.vector_weight * vector + weights.keyword_weight * keyword + phrase - penalty)
            .max(0.0);
    ScoreBreakdown {
        vector,
        keyword,
        phrase,
        hybrid,
    }
}

/// Score a chunk against a query for the local strategy.
pub fn score_chunk(
    query: &str,
    matcher: &TermMatcher,
    query_embedding: &Embedding,
    chunk_embedding: &Embedding,
    text: &str,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    let vector = embedding_similarity(query_embedding, chunk_embedding) as f64;
    let keyword = matcher.keyword_score(text, weights.keyword_scale);
    combine(
        vector,
        keyword,
        contains_phrase(query, text),
        chunk_embedding.is_degraded(),
        weights,
    )
}

/// Sort results by `hybrid_score` descending and keep the first `limit`.
///
/// Ties break on document id then chunk index so ordering is deterministic.
/// No per-document cap is applied.
pub fn rank(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(compare_results);
    results.truncate(limit);
    results
}

pub(crate) fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.hybrid_score
        .partial_cmp(&a.hybrid_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.chunk_index.cmp(&b.chunk_index))
}
