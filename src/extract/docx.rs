use super::{ExtractError, TextExtractor, read_bytes};
use quick_xml::{Reader, events::Event};
use std::{io::Read, path::Path};

const DOCUMENT_PART: &str = "word/document.xml";
/// Upper bound on the decompressed document part (zip-bomb guard).
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;

/// Word documents: text runs of `word/document.xml`, one line per paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        let xml = document_part(&bytes)?;
        paragraphs_text(&xml)
    }
}

fn document_part(bytes: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|error| ExtractError::Docx(error.to_string()))?;
    let entry = archive
        .by_name(DOCUMENT_PART)
        .map_err(|error| ExtractError::Docx(format!("{DOCUMENT_PART}: {error}")))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_PART_BYTES)
        .read_to_end(&mut xml)
        .map_err(|error| ExtractError::Docx(error.to_string()))?;
    if xml.len() as u64 >= MAX_PART_BYTES {
        return Err(ExtractError::Docx(format!(
            "{DOCUMENT_PART} exceeds {MAX_PART_BYTES} bytes"
        )));
    }
    Ok(xml)
}

fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) if element.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(element)) => match element.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                let text = text
                    .unescape()
                    .map_err(|error| ExtractError::Docx(error.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(ExtractError::Docx(error.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
