//! Character-budgeted splitting of documents into overlapping chunks.

use crate::document::{Chunk, Document};
use text_splitter::{ChunkConfig, TextSplitter};
use thiserror::Error;

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Chunk sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of one document.
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Errors raised while configuring the splitter.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Size is zero or the overlap is not smaller than the size.
    #[error("Invalid chunking configuration: chunk_size={chunk_size}, chunk_overlap={chunk_overlap}")]
    InvalidConfig {
        /// Requested chunk size.
        chunk_size: usize,
        /// Requested overlap.
        chunk_overlap: usize,
    },
}

impl ChunkingOptions {
    fn splitter(&self) -> Result<TextSplitter<text_splitter::Characters>, ChunkingError> {
        let invalid = || ChunkingError::InvalidConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        };
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(invalid());
        }

        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|_| invalid())?
            .with_trim(false);
        Ok(TextSplitter::new(config))
    }
}

/// Split `text`, returning each chunk with its starting byte offset.
#[cfg(test)]
fn split_text_with_offsets(
    text: &str,
    options: ChunkingOptions,
) -> Result<Vec<(usize, String)>, ChunkingError> {
    let splitter = options.splitter()?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(splitter
        .chunk_indices(text)
        .map(|(offset, chunk)| (offset, chunk.to_string()))
        .collect())
}

/// Split every document in order; chunks inherit their document's metadata.
/// Whitespace-only chunks are dropped.
pub fn split_documents(
    documents: &[Document],
    options: ChunkingOptions,
) -> Result<Vec<Chunk>, ChunkingError> {
    let splitter = options.splitter()?;

    let chunks: Vec<Chunk> = documents
        .iter()
        .filter(|document| !document.text.trim().is_empty())
        .flat_map(|document| {
            splitter
                .chunks(&document.text)
                .filter(|text| !text.trim().is_empty())
                .map(|text| Chunk::new(text, document.metadata.clone()))
        })
        .collect();

    tracing::debug!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = options.chunk_size,
        chunk_overlap = options.chunk_overlap,
        "Split documents into chunks"
    );
    Ok(chunks)
}
