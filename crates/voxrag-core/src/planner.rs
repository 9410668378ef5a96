//! Agentic multi-pass retrieval.
//!
//! A query runs through four stages:
//!
//! 1. **Analyze**: detect size patterns, device categories and an intent, and
//!    derive an ordered list of query variants (the original always first).
//! 2. **Cascade**: search variant `i` with limit `base_limit + limit_step * i`,
//!    deduplicating on `(document_id, chunk_index)`, until the relevance check
//!    passes or the attempts run out.
//! 3. **Relevance check**: one result covers enough of the concepts, or
//!    enough distinct results were collected.
//! 4. **Rerank**: a pure function of the collected results and the analysis.
//!
//! All thresholds are heuristic and live in [`PlannerConfig`].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::SearchResult;
use crate::scoring::TermMatcher;
use crate::store::VectorStore;

/// Tunables of the cascade, relevance check and rerank.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    pub max_attempts: usize,
    pub base_limit: usize,
    pub limit_step: usize,
    /// Fraction of concepts a single result must contain to pass.
    pub concept_coverage: f64,
    /// Number of distinct results that passes the check on its own.
    pub min_results: usize,
    /// Lower bound on the number of results returned after rerank.
    pub min_final_results: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_limit: 10,
            limit_step: 5,
            concept_coverage: 0.7,
            min_results: 3,
            min_final_results: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    Search,
    Example,
    Specification,
    General,
}

/// Known device classes: canonical name and synonyms.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("tv", &["tv", "television", "tvs", "smart tv"]),
    ("laptop", &["laptop", "notebook", "laptops", "ultrabook"]),
    ("phone", &["phone", "smartphone", "mobile", "cellphone"]),
    ("monitor", &["monitor", "display", "screen", "monitors"]),
    ("tablet", &["tablet", "ipad", "tablets"]),
    ("camera", &["camera", "webcam", "camcorder", "cameras"]),
    ("speaker", &["speaker", "soundbar", "speakers", "subwoofer"]),
    ("refrigerator", &["refrigerator", "fridge", "freezer"]),
    ("washer", &["washer", "washing machine", "dryer"]),
    ("headphones", &["headphones", "earbuds", "headset", "earphones"]),
    ("printer", &["printer", "scanner", "printers"]),
    ("router", &["router", "modem", "wifi", "access point"]),
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "how", "are", "was", "were", "does", "did", "can",
    "could", "would", "should", "will", "about", "from", "into", "this", "that", "these",
    "those", "which", "who", "whom", "when", "where", "why", "have", "has", "had", "you",
    "your", "our", "its", "their", "there", "any", "all", "some", "tell", "show", "find",
    "give", "please", "me", "is", "of", "in", "on", "to", "a", "an", "my", "get", "need",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "is", "are", "can", "does", "do",
];

const SPEC_WORDS: &[&str] = &[
    "dimension", "dimensions", "size", "sizes", "measurement", "measurements", "spec", "specs",
    "specification", "specifications", "weight", "width", "height", "depth",
];

const EXAMPLE_WORDS: &[&str] = &["example", "examples", "sample", "samples", "instance", "instances"];

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(\d+(?:\.\d+)?)\s*(?:(inches|inch|in|cm|mm|ft|feet|gb|tb|mb|kg|lbs|lb|watts|w|hz|mp)\b|(["”]))"#,
    )
    .expect("size regex is valid")
});
static DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?:\.\d+)?)\s*[x×]\s*(\d+(?:\.\d+)?)(?:\s*[x×]\s*(\d+(?:\.\d+)?))?(?:\s*(cm|mm|in|inch|inches|ft|m)\b)?",
    )
    .expect("dimension regex is valid")
});
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("number regex is valid"));

fn normalize_unit(unit: &str) -> String {
    match unit.to_lowercase().as_str() {
        "\"" | "”" | "in" | "inches" | "inch" => "inch".to_string(),
        "feet" => "ft".to_string(),
        "lb" => "lbs".to_string(),
        "watts" => "w".to_string(),
        other => other.to_string(),
    }
}

/// Size and dimension patterns in `text`, normalized (`55"` becomes `55 inch`).
pub fn size_patterns(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut spans = Vec::new();
    for caps in DIMENSION_RE.captures_iter(text) {
        if let Some(m) = caps.get(0) {
            spans.push(m.range());
        }
        let mut parts: Vec<&str> = vec![&caps[1], &caps[2]];
        if let Some(third) = caps.get(3) {
            parts.push(third.as_str());
        }
        let mut pattern = parts.join(" x ");
        if let Some(unit) = caps.get(4) {
            pattern = format!("{} {}", pattern, normalize_unit(unit.as_str()));
        }
        push_unique(&mut out, pattern);
    }
    for caps in SIZE_RE.captures_iter(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        if spans.iter().any(|r| r.contains(&start)) {
            continue;
        }
        let unit = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| normalize_unit(m.as_str()))
            .unwrap_or_default();
        push_unique(&mut out, format!("{} {}", &caps[1], unit));
    }
    out
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        out.push(value);
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn mentions(lower: &str, tokens: &[String], synonym: &str) -> bool {
    if synonym.contains(' ') {
        lower.contains(synonym)
    } else {
        tokens.iter().any(|t| t == synonym)
    }
}

fn detect_intent(query: &str) -> Intent {
    let lower = query.trim().to_lowercase();
    let toks = tokens(&lower);
    let has = |words: &[&str]| toks.iter().any(|t| words.contains(&t.as_str()));

    if has(SPEC_WORDS)
        || ["how big", "how tall", "how wide", "how heavy"]
            .iter()
            .any(|p| lower.contains(p))
    {
        return Intent::Specification;
    }
    if has(EXAMPLE_WORDS) || lower.contains("such as") {
        return Intent::Example;
    }
    let first = toks.first().map(String::as_str).unwrap_or("");
    if QUESTION_WORDS.contains(&first) || lower.ends_with('?') {
        return Intent::Question;
    }
    if ["find", "search", "look for", "show me", "list"]
        .iter()
        .any(|p| lower.starts_with(p) || lower.contains(&format!(" {}", p)))
    {
        return Intent::Search;
    }
    Intent::General
}

#[derive(Debug, Clone)]
enum ConceptMatcher {
    Size(String),
    Category(Vec<Regex>),
    Term(Regex),
}

fn word_regex(word: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))).ok()
}

impl ConceptMatcher {
    fn matches(&self, text: &str, text_sizes: &[String]) -> bool {
        match self {
            ConceptMatcher::Size(p) => text_sizes.iter().any(|s| s.eq_ignore_ascii_case(p)),
            ConceptMatcher::Category(res) => res.iter().any(|re| re.is_match(text)),
            ConceptMatcher::Term(re) => re.is_match(text),
        }
    }
}

/// Result of the analyze stage.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    /// Ordered variants; the first is always the original query.
    pub expanded_queries: Vec<String>,
    pub concepts: Vec<String>,
    pub intent: Intent,
    pub size_patterns: Vec<String>,
    pub categories: Vec<String>,
    #[serde(skip)]
    matchers: Vec<ConceptMatcher>,
}

impl QueryAnalysis {
    /// Number of concepts present in `text`.
    pub fn concept_hits(&self, text: &str) -> usize {
        let sizes = size_patterns(text);
        self.matchers
            .iter()
            .filter(|m| m.matches(text, &sizes))
            .count()
    }
}

/// Analyze a query: patterns, categories, intent, concepts and variants.
pub fn analyze(query: &str) -> QueryAnalysis {
    let original = query.trim().to_string();
    let lower = original.to_lowercase();
    let toks = tokens(&lower);

    let sizes = size_patterns(&original);
    let found: Vec<&(&str, &[&str])> = CATEGORIES
        .iter()
        .filter(|(_, syns)| syns.iter().any(|s| mentions(&lower, &toks, s)))
        .collect();
    let intent = detect_intent(&original);

    let mut concepts: Vec<String> = Vec::new();
    let mut matchers = Vec::new();
    for s in &sizes {
        if !concepts.contains(s) {
            concepts.push(s.clone());
            matchers.push(ConceptMatcher::Size(s.clone()));
        }
    }
    for (name, syns) in &found {
        concepts.push(name.to_string());
        matchers.push(ConceptMatcher::Category(
            syns.iter().filter_map(|s| word_regex(s)).collect(),
        ));
    }
    for t in &toks {
        if t.chars().count() > 2
            && !STOPWORDS.contains(&t.as_str())
            && !concepts.contains(t)
        {
            if let Some(re) = word_regex(t) {
                concepts.push(t.clone());
                matchers.push(ConceptMatcher::Term(re));
            }
        }
    }

    let mut variants: Vec<String> = vec![original.clone()];
    if !found.is_empty() {
        let extra: Vec<&str> = found
            .iter()
            .flat_map(|(_, syns)| syns.iter().copied())
            .filter(|s| !mentions(&lower, &toks, s))
            .take(3)
            .collect();
        if !extra.is_empty() {
            push_unique(&mut variants, format!("{} {}", original, extra.join(" ")));
        }
    }
    if let (Some(size), Some((name, syns))) = (sizes.first(), found.first()) {
        let entity = syns
            .iter()
            .find(|s| !mentions(&lower, &toks, s))
            .unwrap_or(name);
        push_unique(&mut variants, format!("{} {}", size, entity));
    }
    let suffix = match intent {
        Intent::Specification => Some("dimensions specifications measurements"),
        Intent::Example => Some("example sample demonstration"),
        Intent::Question => Some("explanation details"),
        Intent::Search | Intent::General => None,
    };
    if let Some(suffix) = suffix {
        push_unique(&mut variants, format!("{} {}", original, suffix));
    }

    QueryAnalysis {
        original_query: original,
        expanded_queries: variants,
        concepts,
        intent,
        size_patterns: sizes,
        categories: found.iter().map(|(n, _)| n.to_string()).collect(),
        matchers,
    }
}

/// A deduplicated result annotated with the variant that found it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    /// Index of the query variant that first produced this result.
    pub strategy: usize,
    pub rerank_score: f64,
}

/// One cascade attempt, for the reasoning trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptLog {
    pub strategy: usize,
    pub query: String,
    pub limit: usize,
    pub returned: usize,
    pub new_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    pub results: Vec<PlannedResult>,
    pub attempts: usize,
    pub relevance_passed: bool,
    pub steps: Vec<AttemptLog>,
}

/// Explanation returned alongside agentic results.
#[derive(Debug, Clone, Serialize)]
pub struct Reasoning {
    pub intent: Intent,
    pub concepts: Vec<String>,
    pub expanded_queries: Vec<String>,
    pub attempts: usize,
    pub relevance_passed: bool,
    pub steps: Vec<AttemptLog>,
}

impl Reasoning {
    pub fn new(analysis: &QueryAnalysis, outcome: &CascadeOutcome) -> Self {
        Self {
            intent: analysis.intent,
            concepts: analysis.concepts.clone(),
            expanded_queries: analysis.expanded_queries.clone(),
            attempts: outcome.attempts,
            relevance_passed: outcome.relevance_passed,
            steps: outcome.steps.clone(),
        }
    }
}

/// Agentic query planner over any [`VectorStore`].
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    config: PlannerConfig,
}

impl QueryPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Search variants in order until the relevance check passes.
    ///
    /// A failing store query counts as an attempt that returned nothing.
    pub async fn cascade(&self, store: &dyn VectorStore, analysis: &QueryAnalysis) -> CascadeOutcome {
        let attempts = self.config.max_attempts.min(analysis.expanded_queries.len());
        let mut seen: HashSet<(String, usize)> = HashSet::new();
        let mut results: Vec<PlannedResult> = Vec::new();
        let mut steps = Vec::with_capacity(attempts);
        let mut relevance_passed = false;

        for (i, variant) in analysis.expanded_queries.iter().take(attempts).enumerate() {
            let limit = self.config.base_limit + self.config.limit_step * i;
            let (found, error) = match store.query(variant, limit).await {
                Ok(found) => (found, None),
                Err(e) => {
                    tracing::warn!(strategy = i, error = %e, "cascade attempt failed");
                    (Vec::new(), Some(e.to_string()))
                }
            };

            let returned = found.len();
            let mut new_results = 0;
            for r in found {
                if seen.insert(r.key()) {
                    new_results += 1;
                    results.push(PlannedResult {
                        rerank_score: r.hybrid_score,
                        result: r,
                        strategy: i,
                    });
                }
            }
            tracing::debug!(strategy = i, query = %variant, limit, returned, new_results, "cascade attempt");
            steps.push(AttemptLog {
                strategy: i,
                query: variant.clone(),
                limit,
                returned,
                new_results,
                error,
            });

            if self.relevance_check(&results, analysis) {
                relevance_passed = true;
                break;
            }
        }

        CascadeOutcome {
            attempts: steps.len(),
            results,
            relevance_passed,
            steps,
        }
    }

    /// Whether the collected results are good enough to stop the cascade.
    pub fn relevance_check(&self, results: &[PlannedResult], analysis: &QueryAnalysis) -> bool {
        if results.is_empty() {
            return false;
        }
        if results.len() >= self.config.min_results {
            return true;
        }
        let total = analysis.concepts.len();
        if total == 0 {
            return false;
        }
        results.iter().any(|r| {
            analysis.concept_hits(&r.result.content) as f64 / total as f64
                >= self.config.concept_coverage
        })
    }

    /// Rerank score of one result. Depends only on the result's base score,
    /// its strategy and the analysis.
    pub fn rerank_score(&self, r: &PlannedResult, analysis: &QueryAnalysis, terms: &TermMatcher) -> f64 {
        let text = &r.result.content;
        let max_attempts = self.config.max_attempts.max(1);

        let term_boost: f64 = terms
            .counts(text)
            .iter()
            .map(|&c| (0.1 * c as f64).min(0.5))
            .sum();
        let concept_boost = 0.3 * analysis.concept_hits(text) as f64;
        let strategy_bonus =
            0.2 * max_attempts.saturating_sub(r.strategy) as f64 / max_attempts as f64;

        let lower = text.to_lowercase();
        let intent_bonus = match analysis.intent {
            Intent::Specification if !size_patterns(text).is_empty() => 0.5,
            Intent::Example if lower.contains("example") || lower.contains("e.g.") => 0.2,
            Intent::Question if NUMBER_RE.is_match(text) => 0.2,
            _ => 0.0,
        };

        r.result.hybrid_score + term_boost + concept_boost + strategy_bonus + intent_bonus
    }

    /// Score, sort and truncate to `max(limit, min_final_results)`.
    pub fn rerank(
        &self,
        mut results: Vec<PlannedResult>,
        analysis: &QueryAnalysis,
        limit: usize,
    ) -> Vec<PlannedResult> {
        let terms = TermMatcher::for_query(&analysis.original_query);
        for r in &mut results {
            r.rerank_score = self.rerank_score(r, analysis, &terms);
        }
        results.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.result.document_id.cmp(&b.result.document_id))
                .then_with(|| a.result.chunk_index.cmp(&b.result.chunk_index))
        });
        results.truncate(limit.max(self.config.min_final_results));
        results
    }

    /// Analyze, cascade and rerank in one call.
    pub async fn run(
        &self,
        store: &dyn VectorStore,
        query: &str,
        limit: usize,
    ) -> (Vec<PlannedResult>, Reasoning) {
        let analysis = analyze(query);
        let outcome = self.cascade(store, &analysis).await;
        let reasoning = Reasoning::new(&analysis, &outcome);
        let results = self.rerank(outcome.results, &analysis, limit);
        (results, reasoning)
    }
}
