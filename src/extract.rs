//! Plain-text extraction for binary corpus documents (DOCX, PDF).
//!
//! The loader supplies raw bytes plus a file extension; this module returns
//! UTF-8 text suitable for chunking. DOCX paragraphs become newline-separated
//! lines so the chunker can split on paragraph boundaries.

use std::io::Read;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure; the ingestion pipeline logs it and skips the document.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file extension: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from document bytes based on the file extension.
///
/// `txt` and `md` are decoded as UTF-8 (lossy); `docx` and `pdf` go through
/// format-specific extraction.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension.to_ascii_lowercase().as_str() {
        "txt" | "md" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
    }
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraph_text(&doc_xml)
}

/// Walks the WordprocessingML body collecting `w:t` text runs, emitting one
/// line per non-empty `w:p` paragraph.
fn docx_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    let trimmed = current.trim();
                    if !trimmed.is_empty() {
                        paragraphs.push(trimmed.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("hello world".as_bytes(), "txt").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn markdown_passes_through() {
        let text = extract_text("# Title\n\nBody".as_bytes(), "md").unwrap();
        assert_eq!(text, "# Title\n\nBody");
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_text(b"foo", "xlsx").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", "docx").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", "pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = br#"<w:document xmlns:w="ns"><w:body>
            <w:p><w:r><w:t>Clause 1.</w:t></w:r><w:r><w:t> Payment terms.</w:t></w:r></w:p>
            <w:p></w:p>
            <w:p><w:r><w:t>Clause 2.</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = docx_paragraph_text(xml).unwrap();
        assert_eq!(text, "Clause 1.Payment terms.\nClause 2.");
    }
}
