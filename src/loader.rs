//! File loading and chunking
//!
//! The coordinator only needs "path in, chunks out"; parsing formats is
//! somebody else's job. `PlainTextLoader` covers UTF-8 text (and PDFs with
//! the `pdf` feature) so the CLI works end to end.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;

/// Form feed, used by text extractors as a page separator
const PAGE_BREAK: char = '\u{c}';

/// One chunk produced by a loader
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedChunk {
    pub text: String,
    pub page_label: Option<String>,
}

#[async_trait]
pub trait ChunkLoader: Send + Sync {
    /// Split file contents that were already read from `path`. The path is
    /// only used to pick a format and for error messages.
    async fn load_bytes(&self, path: &Path, bytes: Vec<u8>) -> Result<Vec<LoadedChunk>>;

    /// Read and split a file. Errors mean the file is unreadable or corrupt.
    async fn load(&self, path: &Path) -> Result<Vec<LoadedChunk>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::Load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.load_bytes(path, bytes).await
    }
}

/// Paragraph-packing loader for plain text
pub struct PlainTextLoader {
    max_chunk_chars: usize,
}

impl PlainTextLoader {
    pub fn new(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }

    /// Split text into chunks; form feeds start a new page.
    ///
    /// Page labels are 1-based and only set when the text has more than one page.
    pub fn split(&self, text: &str) -> Vec<LoadedChunk> {
        let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        let paged = pages.len() > 1;

        let mut chunks = Vec::new();
        for (page_no, page) in pages.iter().enumerate() {
            let page_label = paged.then(|| (page_no + 1).to_string());
            for piece in self.pack_paragraphs(page) {
                chunks.push(LoadedChunk {
                    text: piece,
                    page_label: page_label.clone(),
                });
            }
        }
        chunks
    }

    fn pack_paragraphs(&self, page: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();

        for paragraph in page.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            for part in split_long(paragraph, self.max_chunk_chars) {
                let joined_len = current.chars().count() + 2 + part.chars().count();
                if !current.is_empty() && joined_len > self.max_chunk_chars {
                    pieces.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(part);
            }
        }

        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    fn read_text(path: &Path, bytes: Vec<u8>) -> Result<String> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            return extract_pdf(path, &bytes);
        }

        String::from_utf8(bytes).map_err(|_| {
            Error::Load(format!("{} is not valid UTF-8 text", path.display()))
        })
    }
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Load(format!("Failed to extract text from {}: {}", path.display(), e)))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(path: &Path, _bytes: &[u8]) -> Result<String> {
    Err(Error::Load(format!(
        "Cannot read {}: PDF support requires the 'pdf' feature",
        path.display()
    )))
}

/// Cut a paragraph into pieces of at most `max` chars, preferring whitespace
fn split_long(paragraph: &str, max: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = paragraph;

    while rest.chars().count() > max {
        let limit = rest
            .char_indices()
            .nth(max)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let cut = rest[..limit]
            .rfind(char::is_whitespace)
            .filter(|&idx| idx > 0)
            .unwrap_or(limit);
        parts.push(rest[..cut].trim_end());
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

#[async_trait]
impl ChunkLoader for PlainTextLoader {
    async fn load_bytes(&self, path: &Path, bytes: Vec<u8>) -> Result<Vec<LoadedChunk>> {
        let text = Self::read_text(path, bytes)?;
        Ok(self.split(&text))
    }
}
