use std::time::Duration;

use serde::Serialize;

use super::DocumentError;
use crate::cancel::CancelToken;

/// How a document's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PdfDirect,
    Ocr,
    PlainText,
}

/// Text recovered from one fetched document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedDocument {
    pub locator: String,
    pub method: ExtractionMethod,
    pub text: String,
    pub page_count: usize,
    /// Pages whose OCR failed and were left out.
    pub skipped_pages: Vec<usize>,
}

impl ExtractedDocument {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Retrieves raw document bytes by locator.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(
        &self,
        locator: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, DocumentError>;
}

/// Recognizes text in one encoded page image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image_bytes: &[u8], languages: &str) -> Result<String, DocumentError>;
}

/// Structural text extraction from a PDF's text layer, one string per page.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, DocumentError>;
}

/// Rasterizes PDF pages for OCR.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, DocumentError>;

    /// PNG bytes of page `page_index` (0-based) at `dpi`.
    fn render_page(&self, pdf_bytes: &[u8], page_index: usize, dpi: u32)
        -> Result<Vec<u8>, DocumentError>;
}
