use super::{ExtractError, TextExtractor, read_bytes};
use std::path::Path;

/// PDF text layer extraction via `pdf-extract`. Pages are concatenated in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|error| {
            ExtractError::Pdf(format!("{}: {error}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn garbage_bytes_fail_as_pdf_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").expect("write");
        assert!(matches!(
            PdfExtractor.extract(&path),
            Err(ExtractError::Pdf(_))
        ));
    }
}
