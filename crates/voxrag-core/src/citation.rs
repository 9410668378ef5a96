//! Voice-friendly answers with citations.
//!
//! Results are grouped by document in rank order. For each document the
//! best-ranked chunk is scanned with a fixed-width sliding window and the
//! window holding the most query-term and concept matches becomes the
//! excerpt. Excerpts snap to nearby sentence boundaries, carry `...` where
//! text was cut, and have matched terms wrapped in `**`.

use regex::Regex;
use serde::Serialize;

use crate::models::SearchResult;
use crate::scoring::query_terms;

const WINDOW_STEP: usize = 20;
const SNAP_DISTANCE: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub document_id: String,
    pub file_name: String,
    pub chunk_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_note: Option<String>,
}

/// Case-insensitive whole-word matcher over a set of terms.
#[derive(Debug, Clone)]
pub struct Highlighter {
    re: Option<Regex>,
}

impl Highlighter {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        let mut terms: Vec<&str> = terms
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| t.chars().count() > 1)
            .collect();
        // Longest first so "55 inch" wins over "55".
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        terms.dedup();
        if terms.is_empty() {
            return Self { re: None };
        }
        let alternation = terms
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        Self {
            re: Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).ok(),
        }
    }

    /// Byte offsets where a match starts.
    fn match_starts(&self, text: &str) -> Vec<usize> {
        match &self.re {
            Some(re) => re.find_iter(text).map(|m| m.start()).collect(),
            None => Vec::new(),
        }
    }

    pub fn highlight(&self, text: &str) -> String {
        match &self.re {
            Some(re) => re.replace_all(text, "**$0**").into_owned(),
            None => text.to_string(),
        }
    }
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Best excerpt of `text` at most `window` characters wide, plus ellipses.
pub fn best_excerpt(text: &str, highlighter: &Highlighter, window: usize) -> String {
    let text = text.trim();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let window = window.max(1);
    if len <= window {
        return highlighter.highlight(text);
    }

    // Char index of every match start.
    let byte_to_char: Vec<usize> = {
        let starts = highlighter.match_starts(text);
        let mut out = Vec::with_capacity(starts.len());
        let mut si = 0;
        for (ci, (bi, _)) in text.char_indices().enumerate() {
            while si < starts.len() && starts[si] == bi {
                out.push(ci);
                si += 1;
            }
        }
        out
    };

    let last_start = len - window;
    let mut candidates: Vec<usize> = (0..=last_start).step_by(WINDOW_STEP).collect();
    if candidates.last() != Some(&last_start) {
        candidates.push(last_start);
    }
    let mut best = (0usize, 0usize);
    for &s in &candidates {
        let count = byte_to_char
            .iter()
            .filter(|&&p| p >= s && p < s + window)
            .count();
        if count > best.1 {
            best = (s, count);
        }
    }

    let mut start = best.0;
    let mut end = start + window;

    if start > 0 {
        let limit = (start + SNAP_DISTANCE).min(end);
        if let Some(p) = (start..limit).find(|&p| p > 0 && is_sentence_end(chars[p - 1])) {
            start = p;
        }
        while start < end && chars[start].is_whitespace() {
            start += 1;
        }
    }
    if end < len {
        let floor = end.saturating_sub(SNAP_DISTANCE).max(start + 1);
        if let Some(q) = (floor..=end).rev().find(|&q| is_sentence_end(chars[q - 1])) {
            end = q;
        }
    }

    let body: String = chars[start..end].iter().collect();
    let body = body.trim();
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&highlighter.highlight(body));
    if end < len {
        out.push_str("...");
    }
    out
}

/// Composes answers from ranked results.
#[derive(Debug, Clone)]
pub struct CitationFormatter {
    window: usize,
}

impl Default for CitationFormatter {
    fn default() -> Self {
        Self { window: 300 }
    }
}

impl CitationFormatter {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Build the answer. `results` must already be in rank order;
    /// `attempts` adds the retrieval note used in agentic mode.
    pub fn format<'a, I>(
        &self,
        query: &str,
        concepts: &[String],
        results: I,
        attempts: Option<usize>,
    ) -> FormattedAnswer
    where
        I: IntoIterator<Item = &'a SearchResult>,
    {
        let mut terms = query_terms(query);
        terms.extend(concepts.iter().cloned());
        let highlighter = Highlighter::new(&terms);

        let mut groups: Vec<(Citation, &SearchResult)> = Vec::new();
        for r in results {
            match groups.iter_mut().find(|(c, _)| c.document_id == r.document_id) {
                Some((c, _)) => {
                    if !c.chunk_indices.contains(&r.chunk_index) {
                        c.chunk_indices.push(r.chunk_index);
                    }
                }
                None => groups.push((
                    Citation {
                        document_id: r.document_id.clone(),
                        file_name: r.file_name.clone(),
                        chunk_indices: vec![r.chunk_index],
                    },
                    r,
                )),
            }
        }

        let attempts_note = attempts.map(|n| {
            format!(
                "(Found using {} search attempt{}.)",
                n,
                if n == 1 { "" } else { "s" }
            )
        });

        if groups.is_empty() {
            return FormattedAnswer {
                text: "I couldn't find relevant information in your documents.".to_string(),
                citations: Vec::new(),
                attempts_note,
            };
        }

        let names: Vec<&str> = groups.iter().map(|(c, _)| c.file_name.as_str()).collect();
        let mut text = format!(
            "I found relevant information in {} document{}: {}.",
            groups.len(),
            if groups.len() == 1 { "" } else { "s" },
            names.join(", ")
        );
        for (c, best) in &groups {
            text.push_str("\n\nFrom ");
            text.push_str(&c.file_name);
            text.push_str(": ");
            text.push_str(&best_excerpt(&best.content, &highlighter, self.window));
        }
        if let Some(note) = &attempts_note {
            text.push_str("\n\n");
            text.push_str(note);
        }

        FormattedAnswer {
            text,
            citations: groups.into_iter().map(|(c, _)| c).collect(),
            attempts_note,
        }
    }
}
