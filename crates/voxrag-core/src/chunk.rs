//! Sentence-boundary text chunker with word-level overlap.
//!
//! Splits normalized document text into bounded segments for embedding.
//!
//! # Algorithm
//!
//! 1. Text no longer than `max_chunk_size` characters is returned unchanged
//!    as a single chunk.
//! 2. Otherwise the text is split into sentences: a sentence ends at `.`,
//!    `!` or `?` followed by whitespace (or end of text), or at a line break.
//!    Text with no boundary at all is returned whole as one chunk.
//! 3. Sentences are packed greedily, joined by a single space, until adding
//!    the next sentence would exceed `max_chunk_size`. A sentence that alone
//!    exceeds the limit is hard-split on word boundaries.
//! 4. Every chunk after the first is prefixed with the trailing words of the
//!    previous chunk, at least `overlap_chars` characters of them (or the whole
//!    previous chunk when it is shorter).
//!
//! The overlap means a chunk may be up to roughly
//! `max_chunk_size + overlap_chars` characters long.
//!
//! # Example
//!
//! ```rust
//! use voxrag_core::chunk::{chunk_text, ChunkParams};
//!
//! let chunks = chunk_text("One. Two. Three.", ChunkParams::SMALL);
//! assert_eq!(chunks, vec!["One. Two. Three.".to_string()]);
//! ```

/// Chunk size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub max_chunk_size: usize,
    pub overlap_chars: usize,
}

impl ChunkParams {
    /// Profile for short, precise chunks.
    pub const SMALL: ChunkParams = ChunkParams {
        max_chunk_size: 1500,
        overlap_chars: 300,
    };

    /// Profile for long-context chunks.
    pub const LARGE: ChunkParams = ChunkParams {
        max_chunk_size: 4000,
        overlap_chars: 800,
    };
}

impl Default for ChunkParams {
    fn default() -> Self {
        ChunkParams::SMALL
    }
}

/// Split `text` into overlapping, sentence-respecting chunks.
///
/// # Guarantees
///
/// - The result is never empty; `""` yields `[""]`.
/// - Input of at most `max_chunk_size` characters yields exactly `[text]`.
/// - The first chunk carries no overlap.
pub fn chunk_text(text: &str, params: ChunkParams) -> Vec<String> {
    let max_chars = params.max_chunk_size.max(1);

    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return vec![text.to_string()];
    }

    let bodies = pack_sentences(&sentences, max_chars);

    let mut chunks = Vec::with_capacity(bodies.len());
    for (i, body) in bodies.iter().enumerate() {
        if i == 0 || params.overlap_chars == 0 {
            chunks.push(body.clone());
            continue;
        }
        let tail = overlap_tail(&bodies[i - 1], params.overlap_chars);
        if tail.is_empty() {
            chunks.push(body.clone());
        } else {
            chunks.push(format!("{} {}", tail, body));
        }
    }
    chunks
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i + 1),
            '.' | '!' | '?' => match chars.peek() {
                None => Some(i + 1),
                Some(&(_, next)) if next.is_whitespace() => Some(i + 1),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            push_trimmed(&mut out, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut out, &text[start..]);
    out
}

/// Trailing words of `prev` totalling at least `overlap_chars` characters.
///
/// Returns a literal suffix of `prev` (whitespace inside it preserved), the
/// whole trimmed chunk if it is shorter than `overlap_chars`, and `""` when
/// `overlap_chars` is zero.
pub fn overlap_tail(prev: &str, overlap_chars: usize) -> &str {
    let trimmed = prev.trim_end();
    if overlap_chars == 0 || trimmed.is_empty() {
        return "";
    }

    let mut start = trimmed.len();
    loop {
        let before = trimmed[..start].trim_end();
        start = before
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        if start == 0 || char_len(&trimmed[start..]) >= overlap_chars {
            break;
        }
    }
    trimmed[start..].trim_start()
}

fn pack_sentences(sentences: &[&str], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let len = char_len(sentence);

        if len > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
            let mut pieces = split_words(sentence, max_chars);
            if let Some(last) = pieces.pop() {
                chunks.extend(pieces);
                current_len = char_len(&last);
                current = last;
            }
            continue;
        }

        let would_be = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };
        if would_be > max_chars && !current.is_empty() {
            flush(&mut chunks, &mut current, &mut current_len);
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }

    flush(&mut chunks, &mut current, &mut current_len);
    chunks
}

/// Hard-split an oversized sentence on word boundaries; a single word
/// longer than the limit is split on character boundaries.
fn split_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in sentence.split_whitespace() {
        let len = char_len(word);
        if len > max_chars {
            flush(&mut pieces, &mut current, &mut current_len);
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_chars) {
                pieces.push(part.iter().collect());
            }
            continue;
        }
        let would_be = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };
        if would_be > max_chars {
            flush(&mut pieces, &mut current, &mut current_len);
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += len;
    }

    flush(&mut pieces, &mut current, &mut current_len);
    pieces
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
    *current_len = 0;
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max: usize, overlap: usize) -> ChunkParams {
        ChunkParams {
            max_chunk_size: max,
            overlap_chars: overlap,
        }
    }

    fn sample_text(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {} talks about item {}.", i, i * 7))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Strip injected overlap, returning the pre-overlap bodies.
    fn bodies(chunks: &[String], overlap: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push(c.clone());
                continue;
            }
            let tail = overlap_tail(&out[i - 1], overlap).to_string();
            let prefix = format!("{} ", tail);
            let body = c
                .strip_prefix(&prefix)
                .unwrap_or_else(|| panic!("chunk {} does not start with overlap {:?}", i, tail));
            out.push(body.to_string());
        }
        out
    }

    #[test]
    fn test_empty_text_yields_one_chunk() {
        let chunks = chunk_text("", ChunkParams::SMALL);
        assert_eq!(chunks, vec![String::new()]);
    }

    #[test]
    fn test_single_word_yields_one_chunk() {
        let chunks = chunk_text("warranty", params(3, 1));
        assert_eq!(chunks, vec!["warranty".to_string()]);
    }

    #[test]
    fn test_text_under_limit_is_unchanged() {
        let text = "The warranty is 24 months.\n\nReturns accepted  within 30 days!";
        let chunks = chunk_text(text, ChunkParams::SMALL);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_no_boundaries_returns_whole_text() {
        let text = "word ".repeat(100);
        let text = text.trim_end();
        let chunks = chunk_text(text, params(50, 10));
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_bodies_respect_limit_and_reconstruct_text() {
        let text = sample_text(40);
        let chunks = chunk_text(&text, params(200, 40));
        assert!(chunks.len() > 1);

        let bodies = bodies(&chunks, 40);
        for b in &bodies {
            assert!(b.chars().count() <= 200, "body too long: {}", b.len());
        }
        assert_eq!(bodies.join(" "), text);
    }

    #[test]
    fn test_first_chunk_has_no_overlap() {
        let text = sample_text(20);
        let chunks = chunk_text(&text, params(150, 30));
        assert!(chunks[0].starts_with("Sentence number 0 "));
        assert_eq!(bodies(&chunks, 30)[0], chunks[0]);
    }

    #[test]
    fn test_overlap_continuity() {
        let text = sample_text(30);
        let overlap = 45;
        let chunks = chunk_text(&text, params(180, overlap));
        let bodies = bodies(&chunks, overlap);

        for i in 0..chunks.len() - 1 {
            let tail = overlap_tail(&bodies[i], overlap);
            assert!(bodies[i].ends_with(tail));
            assert!(chunks[i + 1].starts_with(tail));
            assert!(tail.chars().count() >= overlap.min(bodies[i].chars().count()));
        }
    }

    #[test]
    fn test_zero_overlap_has_no_prefix() {
        let text = sample_text(20);
        let chunks = chunk_text(&text, params(150, 0));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_line_breaks_are_boundaries() {
        let rows: Vec<String> = (0..30)
            .map(|i| format!("Name: Person{}, Age: {}", i, 20 + i))
            .collect();
        let text = rows.join("\n");
        let chunks = chunk_text(&text, params(120, 0));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().any(|c| c.contains("Name: Person29, Age: 49")));
    }

    #[test]
    fn test_oversized_sentence_is_hard_split() {
        let long_sentence = format!("{}.", "alpha ".repeat(60).trim_end());
        let text = format!("Short one. {} Another short one.", long_sentence);
        let chunks = chunk_text(&text, params(100, 0));
        for c in &chunks {
            assert!(c.chars().count() <= 100, "chunk too long: {}", c.len());
        }
        assert!(chunks.len() >= 4);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Größe ist 55 Zoll. Über alles gut! ".repeat(20);
        let chunks = chunk_text(&text, params(60, 12));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_overlap_tail_shorter_than_requested() {
        assert_eq!(overlap_tail("tiny chunk", 100), "tiny chunk");
        assert_eq!(overlap_tail("a b c d", 3), "c d");
        assert_eq!(overlap_tail("a b c d", 0), "");
    }

    #[test]
    fn test_profiles() {
        assert_eq!(ChunkParams::default(), ChunkParams::SMALL);
        assert_eq!(ChunkParams::LARGE.max_chunk_size, 4000);
        assert_eq!(ChunkParams::LARGE.overlap_chars, 800);
    }
}
