use crate::error::DocumentError;
use crate::models::Page;
use lopdf::Document;
use std::path::Path;

/// Reads a source document into one `Page` per physical page, in order.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Page>, DocumentError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Page>, DocumentError> {
        let label = path.display().to_string();
        let document = Document::load(path).map_err(|error| unreadable(&label, error))?;
        pages_from_document(&document, &label)
    }
}

pub fn load_pages(path: &Path) -> Result<Vec<Page>, DocumentError> {
    LopdfExtractor.extract_pages(path)
}

pub fn load_pages_from_bytes(bytes: &[u8], label: &str) -> Result<Vec<Page>, DocumentError> {
    let document = Document::load_mem(bytes).map_err(|error| unreadable(label, error))?;
    pages_from_document(&document, label)
}

fn pages_from_document(document: &Document, label: &str) -> Result<Vec<Page>, DocumentError> {
    if document.is_encrypted() {
        return Err(DocumentError::Unreadable {
            path: label.to_string(),
            details: "document is encrypted".to_string(),
        });
    }

    // lopdf numbers pages from 1; pages are exposed 0-based.
    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let raw_text = document
            .extract_text(&[page_no])
            .map_err(|error| unreadable(label, format!("page {page_no}: {error}")))?;

        pages.push(Page {
            page_number: page_no.saturating_sub(1),
            raw_text,
        });
    }

    if pages.is_empty() {
        return Err(DocumentError::Empty {
            path: label.to_string(),
        });
    }

    Ok(pages)
}

fn unreadable(label: &str, error: impl ToString) -> DocumentError {
    DocumentError::Unreadable {
        path: label.to_string(),
        details: error.to_string(),
    }
}
