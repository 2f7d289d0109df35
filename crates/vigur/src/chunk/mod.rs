//! Document chunking.
//!
//! Files are extracted into plain text, split into size-bounded chunks, and
//! annotated with enough metadata to locate each chunk in its source.

mod extract;
mod loader;
mod splitter;

pub use loader::{walk_files, WalkStats};

use std::path::Path;

use crate::error::{VigurError, VigurResult};

/// File extensions the chunker accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown", "docx", "html", "htm"];

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
    /// Number of chunks embedded per batch.
    pub batch_size: usize,
    /// Files larger than this are rejected.
    pub max_file_size: u64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            batch_size: 32,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> VigurResult<()> {
        if self.chunk_size == 0 {
            return Err(VigurError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(VigurError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(VigurError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Source location of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// 1-based page number, present for paginated formats.
    pub page_number: Option<u32>,
}

/// A chunk of extracted text with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Whether a path has a supported extension.
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Extract and chunk a single file.
///
/// Validates existence, extension, and size before reading. Pages of
/// paginated formats are chunked independently so every chunk carries its
/// page number.
pub fn chunk_file(path: &Path, config: &ChunkConfig) -> VigurResult<Vec<Chunk>> {
    config.validate()?;
    if !path.exists() {
        return Err(VigurError::FileNotFound(path.to_path_buf()));
    }
    let ext = extension_of(path).unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(VigurError::UnsupportedFormat(ext));
    }
    let size = std::fs::metadata(path)
        .map_err(|e| VigurError::FileRead {
            path: path.to_path_buf(),
            source: e.into(),
        })?
        .len();
    if size > config.max_file_size {
        return Err(VigurError::InvalidConfig(format!(
            "file exceeds max_file_size ({size} > {})",
            config.max_file_size
        )));
    }

    let pages = extract::extract_pages(path, &ext)?;
    let file_path = path.to_string_lossy().into_owned();
    let markdown = matches!(ext.as_str(), "md" | "markdown");

    let mut texts: Vec<(Option<u32>, String)> = Vec::new();
    for page in pages {
        for piece in splitter::split(&page.text, config.chunk_size, config.chunk_overlap, markdown)
        {
            texts.push((page.page_number, piece));
        }
    }

    let total = texts.len();
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, (page_number, text))| Chunk {
            text,
            metadata: ChunkMetadata {
                file_path: file_path.clone(),
                chunk_index: i,
                total_chunks: total,
                page_number,
            },
        })
        .collect())
}
