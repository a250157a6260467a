//! Document processor: text cleaning and overlap-aware chunking
//!
//! Turns raw text (web pages, local files) into [`Document`] chunks ready
//! for embedding. All sizes and offsets are measured in characters.

use crate::document::Document;
use delve_core::{DelveError, DelveResult, ErrorContext, RetrievalConfig};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \u{00A0}\r\f\v]+").expect("valid space regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));
static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:https?://)?(?:www\.)?").expect("valid scheme regex"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("valid alnum regex"));

/// Search windows (in chars, before the target boundary) for each break kind
const PARAGRAPH_WINDOW: usize = 100;
const SENTENCE_WINDOW: usize = 50;
const WORD_WINDOW: usize = 20;
const MAX_DOC_ID_LEN: usize = 100;

/// Document processor that cleans and chunks text for the retrieval store
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a document into chunk documents.
    ///
    /// Each chunk inherits the parent's metadata plus `chunk_index` and
    /// `chunk_count`; ids become `<doc_id>_chunk_<i>`.
    pub fn process_document(&self, document: &Document) -> Vec<Document> {
        let cleaned = clean_text(&document.text);
        let chunks = chunk_text(&cleaned, self.chunk_size, self.chunk_overlap);
        let chunk_count = chunks.len();

        debug!(
            doc_id = ?document.doc_id,
            chunk_count,
            "Split document into chunks"
        );

        chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), Value::from(index));
                metadata.insert("chunk_count".to_string(), Value::from(chunk_count));

                let doc_id = document
                    .doc_id
                    .as_ref()
                    .map(|id| format!("{}_chunk_{}", id, index));

                Document {
                    text: chunk,
                    metadata,
                    doc_id,
                }
            })
            .collect()
    }

    /// Chunk text fetched from the web, tagging every chunk with its provenance
    pub fn process_text_from_web(&self, text: &str, url: &str, title: Option<&str>) -> Vec<Document> {
        let mut document = Document::new(text)
            .with_id(url_to_doc_id(url))
            .with_metadata("source", "web")
            .with_metadata("url", url);
        if let Some(title) = title {
            document = document.with_metadata("title", title);
        }
        self.process_document(&document)
    }

    /// Read a local text file and chunk it
    pub async fn process_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<Vec<Document>> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DelveError::Storage {
                message: format!("Failed to read {}: {}", path.display(), e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("document_processor")
                    .with_operation("process_file")
                    .with_suggestion("Only UTF-8 text files can be ingested"),
            })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document = Document::new(text)
            .with_id(url_to_doc_id(&path.to_string_lossy()))
            .with_metadata("source", "file")
            .with_metadata("path", path.to_string_lossy().as_ref())
            .with_metadata("title", file_name.as_str());

        let chunks = self.process_document(&document);
        info!(path = %path.display(), chunks = chunks.len(), "Processed file");
        Ok(chunks)
    }
}

/// Normalise whitespace while keeping paragraph structure.
///
/// Tabs and runs of horizontal whitespace become one space, trailing spaces
/// are dropped from every line and runs of blank lines collapse to a single
/// blank line.
pub fn clean_text(text: &str) -> String {
    let text = text.replace('\t', " ");
    let text = MULTI_SPACE.replace_all(&text, " ");
    let lines: Vec<&str> = text.split('\n').map(str::trim_end).collect();
    let text = lines.join("\n");
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

/// Split text into chunks of at most `chunk_size` characters.
///
/// Consecutive chunks overlap by `chunk_overlap` characters unless the
/// chosen break point is too close to the chunk start, in which case the
/// next chunk starts right at the break. Chunks are taken verbatim, so
/// joining them while skipping overlaps reproduces the input.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chunk_size == 0 || chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let target = start + chunk_size;
        if target >= chars.len() {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let end = find_natural_break(&chars, start, target);
        chunks.push(chars[start..end].iter().collect());

        let rewound = end.saturating_sub(chunk_overlap);
        start = if rewound > start { rewound } else { end };
    }

    chunks
}

/// Pick the end of the chunk beginning at `start`, never past `target`.
///
/// Preference order: paragraph break, sentence end, whitespace, hard cut.
/// The returned position is always greater than `start`.
fn find_natural_break(chars: &[char], start: usize, target: usize) -> usize {
    let lower = |window: usize| target.saturating_sub(window).max(start + 1);

    let paragraph = (lower(PARAGRAPH_WINDOW)..target)
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i + 1] == '\n');
    if let Some(pos) = paragraph {
        return pos;
    }

    let sentence = (lower(SENTENCE_WINDOW)..target)
        .rev()
        .find(|&i| chars[i] == '.' && matches!(chars[i + 1], ' ' | '\n'));
    if let Some(pos) = sentence {
        return pos + 1;
    }

    let word = (lower(WORD_WINDOW)..=target)
        .rev()
        .find(|&i| chars[i].is_whitespace());
    if let Some(pos) = word {
        return pos;
    }

    target
}

/// Derive a stable document id from a URL or path
pub fn url_to_doc_id(url: &str) -> String {
    let stripped = URL_SCHEME.replace(url, "");
    let id = NON_ALNUM.replace_all(&stripped, "_");
    id.chars().take(MAX_DOC_ID_LEN).collect()
}
