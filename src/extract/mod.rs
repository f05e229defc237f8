//! Text extraction from stored uploads, dispatched by file extension.

mod docx;
mod pdf;
mod plain;

use std::{collections::HashMap, path::Path, path::PathBuf, sync::Arc};
use thiserror::Error;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use plain::PlainTextExtractor;

/// Errors raised while turning a stored file into plain text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No extractor is registered for the extension.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Plain-text input was not valid UTF-8.
    #[error("File {path} is not valid UTF-8")]
    InvalidUtf8 {
        /// Offending file.
        path: PathBuf,
    },
    /// PDF parsing failed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// DOCX container or XML parsing failed.
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Reads one file format into plain UTF-8 text.
pub trait TextExtractor: Send + Sync {
    /// Extract the text content of `path`.
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Extension-keyed table of extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Registry with the built-in formats: pdf, docx, txt and md.
    pub fn new() -> Self {
        let plain: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor);
        let mut extractors: HashMap<String, Arc<dyn TextExtractor>> = HashMap::new();
        extractors.insert("pdf".into(), Arc::new(PdfExtractor));
        extractors.insert("docx".into(), Arc::new(DocxExtractor));
        extractors.insert("txt".into(), Arc::clone(&plain));
        extractors.insert("md".into(), plain);
        Self { extractors }
    }

    /// Register (or replace) the extractor for `extension`.
    pub fn with_extractor(
        mut self,
        extension: impl Into<String>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        self.extractors
            .insert(extension.into().to_ascii_lowercase(), extractor);
        self
    }

    /// Look up the extractor registered for `extension`.
    pub fn resolve(&self, extension: &str) -> Result<Arc<dyn TextExtractor>, ExtractError> {
        self.extractors
            .get(&extension.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ExtractError::UnsupportedFormat(extension.to_string()))
    }

    /// Extract `path` with the extractor registered for `extension`.
    pub fn extract(&self, path: &Path, extension: &str) -> Result<String, ExtractError> {
        let extractor = self.resolve(extension)?;
        let text = extractor.extract(path)?;
        tracing::debug!(path = %path.display(), extension, chars = text.chars().count(), "Extracted text");
        Ok(text)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
