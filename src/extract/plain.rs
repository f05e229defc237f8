use super::{ExtractError, TextExtractor, read_bytes};
use std::path::Path;

/// UTF-8 text and markdown files, read verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8 {
            path: path.to_path_buf(),
        })
    }
}
