//! Multi-format text extraction.
//!
//! [`Extractor::extract`] turns an uploaded file into one normalized text
//! blob, dispatching on the lower-cased file extension. Parser failures
//! never abort ingestion: they are logged and replaced by a placeholder
//! text noting the failure. Images (and PDFs with no usable text layer) go
//! through the [`Describer`].

use std::io::Read;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use chrono::Utc;
use quick_xml::events::Event;
use regex::Regex;
use thiserror::Error;

use crate::config::ExtractConfig;
use crate::error::EngineError;
use crate::vision::{Describer, IMAGE_PROMPT, OCR_PROMPT};

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
const XLSX_MAX_COLUMNS: usize = 16_384;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("delimited parse failed: {0}")]
    Delimited(#[from] csv::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Format family, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Delimited(u8),
    Json,
    Pdf,
    Image,
    Docx,
    Pptx,
    Xlsx,
    Markup,
    Unsupported,
}

pub fn file_kind(extension: &str) -> FileKind {
    match extension {
        "txt" | "md" | "markdown" | "log" | "rtf" => FileKind::Text,
        "csv" => FileKind::Delimited(b','),
        "tsv" => FileKind::Delimited(b'\t'),
        "json" => FileKind::Json,
        "pdf" => FileKind::Pdf,
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => FileKind::Image,
        "docx" => FileKind::Docx,
        "pptx" => FileKind::Pptx,
        "xlsx" => FileKind::Xlsx,
        "html" | "htm" | "xml" => FileKind::Markup,
        _ => FileKind::Unsupported,
    }
}

/// Lower-cased extension of `name` without the dot, or `""`.
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Best-guess MIME type for an extension.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "rtf" => "application/rtf",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Extraction output.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    /// Pre-built chunks that bypass the chunker (image descriptions).
    pub chunk_override: Option<Vec<String>>,
    /// The text is a placeholder rather than real content.
    pub degraded: bool,
}

impl Extracted {
    fn text(text: String) -> Self {
        Self {
            text,
            chunk_override: None,
            degraded: false,
        }
    }

    fn placeholder(text: String) -> Self {
        Self {
            text,
            chunk_override: None,
            degraded: true,
        }
    }
}

pub struct Extractor {
    describer: Arc<dyn Describer>,
    min_pdf_text_chars: usize,
}

impl Extractor {
    pub fn new(describer: Arc<dyn Describer>, config: &ExtractConfig) -> Self {
        Self {
            describer,
            min_pdf_text_chars: config.min_pdf_text_chars,
        }
    }

    /// Extract text from the file at `path`.
    ///
    /// Only a failure to read the file itself is an error.
    pub async fn extract(
        &self,
        path: &Path,
        original_name: &str,
        mime_type: &str,
    ) -> anyhow::Result<Extracted> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read uploaded file: {}", path.display()))?;
        Ok(self.extract_bytes(&bytes, original_name, mime_type).await)
    }

    pub async fn extract_bytes(&self, bytes: &[u8], original_name: &str, mime_type: &str) -> Extracted {
        let ext = file_extension(original_name);
        let kind = file_kind(&ext);

        let parsed = match kind {
            FileKind::Text => Ok(decode_text(bytes)),
            FileKind::Delimited(delim) => extract_delimited(bytes, delim),
            FileKind::Json => extract_json(bytes),
            FileKind::Markup => Ok(strip_markup(&decode_text(bytes))),
            FileKind::Docx => extract_docx(bytes),
            FileKind::Pptx => extract_pptx(bytes),
            FileKind::Xlsx => extract_xlsx(bytes),
            FileKind::Pdf => return self.extract_pdf(bytes, original_name).await,
            FileKind::Image => return self.describe_image(bytes, original_name, mime_type, &ext).await,
            FileKind::Unsupported => {
                tracing::warn!(file = original_name, extension = %ext, "unsupported file type");
                return Extracted::placeholder(format!(
                    "File: {}\nNote: content extraction is not supported for '.{}' files. \
                     The file has been stored and indexed by name only.",
                    original_name, ext
                ));
            }
        };

        match parsed {
            Ok(text) => Extracted::text(text),
            Err(e) => {
                let failure = EngineError::ExtractionFailure {
                    format: ext.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(file = original_name, error = %failure, "using placeholder");
                Extracted::placeholder(format!(
                    "File: {}\nNote: {}. The file has been stored and indexed by name only.",
                    original_name, failure
                ))
            }
        }
    }

    async fn extract_pdf(&self, bytes: &[u8], original_name: &str) -> Extracted {
        let text = match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => normalize_typography(&text),
            Err(e) => {
                tracing::warn!(file = original_name, error = %e, "PDF text layer unreadable");
                String::new()
            }
        };
        if text.trim().chars().count() >= self.min_pdf_text_chars {
            return Extracted::text(text);
        }

        tracing::info!(file = original_name, "PDF has little text, trying OCR");
        match self
            .describer
            .describe(bytes, "application/pdf", OCR_PROMPT)
            .await
        {
            Ok(ocr) => Extracted::text(normalize_typography(&ocr)),
            Err(e) => {
                tracing::warn!(file = original_name, error = %e, "PDF OCR failed");
                if !text.trim().is_empty() {
                    Extracted::text(text)
                } else {
                    Extracted::placeholder(format!(
                        "PDF file: {}\nNote: This appears to be a scanned or image-based PDF and \
                         text extraction was not successful.",
                        original_name
                    ))
                }
            }
        }
    }

    async fn describe_image(&self, bytes: &[u8], original_name: &str, mime_type: &str, ext: &str) -> Extracted {
        let mime = if mime_type.starts_with("image/") {
            mime_type
        } else {
            mime_for_extension(ext)
        };
        let footer = format!(
            "Metadata:\n- Filename: {}\n- Type: {}\n- Size: {} bytes\n- Uploaded: {}",
            original_name,
            mime,
            bytes.len(),
            Utc::now().to_rfc3339()
        );

        let (text, degraded) = match self.describer.describe(bytes, mime, IMAGE_PROMPT).await {
            Ok(description) => (
                format!(
                    "Image: {}\n\nVision analysis:\n{}\n\n{}",
                    original_name, description, footer
                ),
                false,
            ),
            Err(e) => {
                tracing::warn!(file = original_name, error = %e, "image description failed");
                (
                    format!(
                        "Image: {}\n\nNote: vision analysis unavailable. Basic metadata indexed.\n\n{}",
                        original_name, footer
                    ),
                    true,
                )
            }
        };
        Extracted {
            chunk_override: Some(vec![text.clone()]),
            text,
            degraded,
        }
    }
}

/// UTF-8 with lossy fallback, BOM stripped.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Replace typographic quotes, dashes and ellipses with ASCII forms.
pub fn normalize_typography(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' => out.push('-'),
            '\u{2014}' => out.push_str("--"),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Render a delimited cell with light type inference.
fn infer_cell(raw: &str) -> Option<String> {
    let v = raw.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(i) = v.parse::<i64>() {
        return Some(i.to_string());
    }
    if let Ok(f) = v.parse::<f64>() {
        if f.is_finite() {
            return Some(f.to_string());
        }
    }
    match v.to_lowercase().as_str() {
        "true" => Some("true".to_string()),
        "false" => Some("false".to_string()),
        _ => Some(v.to_string()),
    }
}

/// CSV/TSV to text.
///
/// Rows become `header: value` pairs joined by `, `. A two-column table is
/// a label/value list: its header line is `A: B` and each row `label: value`.
pub fn extract_delimited(bytes: &[u8], delimiter: u8) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut lines = Vec::new();
    if headers.len() == 2 {
        lines.push(format!("{}: {}", headers[0], headers[1]));
    }
    for record in reader.records() {
        let record = record?;
        let line = if headers.len() == 2 {
            match (record.get(0).and_then(infer_cell), record.get(1).and_then(infer_cell)) {
                (Some(label), Some(value)) => format!("{}: {}", label, value),
                (Some(label), None) => label,
                (None, Some(value)) => format!("{}: {}", headers[1], value),
                (None, None) => continue,
            }
        } else {
            let pairs: Vec<String> = record
                .iter()
                .enumerate()
                .filter_map(|(i, cell)| {
                    let value = infer_cell(cell)?;
                    let key = headers
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("column_{}", i + 1));
                    Some(format!("{}: {}", key, value))
                })
                .collect();
            if pairs.is_empty() {
                continue;
            }
            pairs.join(", ")
        };
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

pub fn extract_json(bytes: &[u8]) -> Result<String, ExtractError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("script regex is valid"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("style regex is valid"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex is valid"));
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|div|br|li|tr|h[1-6]|section|article|header|footer|table|ul|ol)\b[^>]*>")
        .expect("block tag regex is valid")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));
static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f]+").expect("space regex is valid"));
static NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n[\n ]*").expect("newline regex is valid"));

/// Strip HTML/XML tags, script and style blocks, decode basic entities and
/// collapse whitespace. Block-level tags become line breaks.
pub fn strip_markup(markup: &str) -> String {
    let s = SCRIPT_RE.replace_all(markup, " ");
    let s = STYLE_RE.replace_all(&s, " ");
    let s = COMMENT_RE.replace_all(&s, " ");
    let s = BLOCK_TAG_RE.replace_all(&s, "\n");
    let s = TAG_RE.replace_all(&s, " ");
    let s = s
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    let s = SPACE_RE.replace_all(&s, " ");
    let s = NEWLINE_RE.replace_all(&s, "\n");
    s.trim().to_string()
}

type ZipReader<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipReader<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut ZipReader<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Collect the text of `<*:t>` elements, one line per `<*:p>` paragraph.
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut line = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => line.push('\t'),
                b"br" => line.push(' '),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                line.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(trimmed);
                    }
                    line.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(trimmed);
    }
    Ok(out)
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    paragraph_text(&xml)
}

fn numbered_entries(archive: &ZipReader<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

pub fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = paragraph_text(&xml)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key || a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Sheet names and their worksheet entry paths, in workbook order.
fn list_sheets(archive: &mut ZipReader<'_>) -> Result<Vec<(String, String)>, ExtractError> {
    let positional = numbered_entries(archive, "xl/worksheets/sheet");
    let Ok(workbook) = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES) else {
        return Ok(positional
            .into_iter()
            .enumerate()
            .map(|(i, p)| (format!("Sheet{}", i + 1), p))
            .collect());
    };

    let mut targets: Vec<(String, String)> = Vec::new();
    if let Ok(rels) = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels", MAX_XML_ENTRY_BYTES) {
        let mut reader = quick_xml::Reader::from_reader(rels.as_slice());
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"Relationship" => {
                    if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                        let target = target.trim_start_matches('/');
                        let path = if target.starts_with("xl/") {
                            target.to_string()
                        } else {
                            format!("xl/{}", target)
                        };
                        targets.push((id, path));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }
    }

    let mut sheets = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(workbook.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = attr(&e, b"name").unwrap_or_else(|| format!("Sheet{}", sheets.len() + 1));
                let path = attr(&e, b"id")
                    .and_then(|id| targets.iter().find(|(rid, _)| *rid == id).map(|(_, p)| p.clone()))
                    .or_else(|| positional.get(sheets.len()).cloned());
                if let Some(path) = path {
                    sheets.push((name, path));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn read_shared_strings(archive: &mut ZipReader<'_>) -> Result<Vec<String>, ExtractError> {
    let Ok(xml) = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES) else {
        return Ok(Vec::new());
    };
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column of a cell reference like `C12`.
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: String = cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters
        .to_ascii_uppercase()
        .bytes()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
        })?;
    Some(n - 1)
}

/// Rows of one worksheet, cells tab-joined.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type = String::new();
    let mut cell_col: Option<usize> = None;
    let mut skip_cell = false;
    let mut value = String::new();
    let mut in_value = false;
    let mut cell_count = 0usize;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_type = attr(&e, b"t").unwrap_or_default();
                    // A reference outside the sheet grid is malformed; drop the cell.
                    (cell_col, skip_cell) = match attr(&e, b"r") {
                        Some(r) => match column_index(&r).filter(|c| *c < XLSX_MAX_COLUMNS) {
                            Some(col) => (Some(col), false),
                            None => (None, true),
                        },
                        None => (None, false),
                    };
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" if skip_cell => cell_count += 1,
                b"c" => {
                    let text = match cell_type.as_str() {
                        "s" => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default(),
                        "b" => if value.trim() == "1" { "TRUE" } else { "FALSE" }.to_string(),
                        _ => value.trim().to_string(),
                    };
                    let col = cell_col.unwrap_or(row.len());
                    if col >= row.len() {
                        row.resize(col + 1, String::new());
                    }
                    row[col] = text;
                    cell_count += 1;
                }
                b"row" => {
                    while row.last().is_some_and(|c| c.is_empty()) {
                        row.pop();
                    }
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                    }
                    row.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Every sheet as a `Sheet: <name>` header followed by tab-joined rows.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let mut sections = Vec::new();
    for (name, path) in list_sheets(&mut archive)?.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &path, MAX_XML_ENTRY_BYTES)?;
        let rows = sheet_rows(&xml, &shared_strings)?;
        let mut section = format!("Sheet: {}", name);
        for r in rows {
            section.push('\n');
            section.push_str(&r);
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}
