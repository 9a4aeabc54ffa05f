use std::sync::Arc;
use std::time::Duration;

use super::format::{sniff_format, DocumentFormat};
use super::sanitize::sanitize_extracted_text;
use super::types::{
    DocumentFetcher, ExtractedDocument, ExtractionMethod, OcrEngine, PdfPageRenderer,
    PdfTextExtractor,
};
use super::DocumentError;
use crate::cancel::CancelToken;
use crate::config::ExtractionConfig;
use crate::pipeline::references::DocumentReference;
use crate::workers::run_ordered;

/// Separator between pages and between documents in concatenated text.
const SECTION_BREAK: &str = "\n\n";

/// Fetches referenced documents and turns them into text.
/// Uses trait objects for every external collaborator, enabling dependency injection.
pub struct DocumentExtractor {
    fetcher: Arc<dyn DocumentFetcher>,
    pdf_text: Arc<dyn PdfTextExtractor>,
    renderer: Arc<dyn PdfPageRenderer>,
    ocr: Arc<dyn OcrEngine>,
    config: ExtractionConfig,
}

impl DocumentExtractor {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        pdf_text: Arc<dyn PdfTextExtractor>,
        renderer: Arc<dyn PdfPageRenderer>,
        ocr: Arc<dyn OcrEngine>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            fetcher,
            pdf_text,
            renderer,
            ocr,
            config,
        }
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.fetch_timeout_secs)
    }

    /// Fetch and extract every reference on a bounded pool. Results are in
    /// discovery order; references never started because of cancellation
    /// come back as `Cancelled`.
    pub fn extract_all(
        &self,
        references: &[DocumentReference],
        cancel: &CancelToken,
    ) -> Vec<Result<ExtractedDocument, DocumentError>> {
        run_ordered(references, self.config.document_workers, cancel, |_, reference| {
            self.extract(reference, cancel)
        })
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(DocumentError::Cancelled)))
        .collect()
    }

    pub fn extract(
        &self,
        reference: &DocumentReference,
        cancel: &CancelToken,
    ) -> Result<ExtractedDocument, DocumentError> {
        let locator = reference.locator.as_str();
        tracing::info!(locator = %locator, "Fetching document");
        let bytes = self.fetcher.fetch(locator, self.fetch_timeout(), cancel)?;
        self.extract_bytes(locator, &bytes, cancel)
    }

    /// Extract text from already-fetched bytes.
    pub fn extract_bytes(
        &self,
        locator: &str,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<ExtractedDocument, DocumentError> {
        if cancel.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }
        let format = sniff_format(bytes);
        tracing::debug!(locator = %locator, format = format.as_str(), bytes = bytes.len(), "Sniffed document");

        let document = match format {
            DocumentFormat::Unsupported => return Err(DocumentError::UnsupportedFormat),
            DocumentFormat::PlainText => {
                let raw = std::str::from_utf8(bytes)
                    .map_err(|e| DocumentError::Encoding(e.to_string()))?;
                let text = sanitize_extracted_text(raw);
                if text.is_empty() {
                    return Err(DocumentError::NoText);
                }
                ExtractedDocument {
                    locator: locator.to_string(),
                    method: ExtractionMethod::PlainText,
                    text,
                    page_count: 1,
                    skipped_pages: vec![],
                }
            }
            DocumentFormat::Pdf => self.extract_pdf(locator, bytes, cancel)?,
        };

        tracing::info!(
            locator = %locator,
            method = ?document.method,
            pages = document.page_count,
            skipped = document.skipped_pages.len(),
            chars = document.char_count(),
            "Text extraction complete"
        );
        Ok(document)
    }

    fn extract_pdf(
        &self,
        locator: &str,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<ExtractedDocument, DocumentError> {
        let pages = self.pdf_text.extract_pages(bytes)?;
        let direct = join_pages(pages.iter().map(|p| sanitize_extracted_text(p)));
        let direct_chars = direct.trim().chars().count();

        if direct_chars >= self.config.min_text_chars {
            return Ok(ExtractedDocument {
                locator: locator.to_string(),
                method: ExtractionMethod::PdfDirect,
                text: direct,
                page_count: pages.len(),
                skipped_pages: vec![],
            });
        }

        tracing::info!(
            locator = %locator,
            chars = direct_chars,
            threshold = self.config.min_text_chars,
            "Direct text below threshold, falling back to OCR"
        );
        self.ocr_pdf(locator, bytes, cancel)
    }

    /// Rasterize every page and OCR it on the page pool. A failed page is
    /// skipped; a document with no recognized text fails.
    fn ocr_pdf(
        &self,
        locator: &str,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<ExtractedDocument, DocumentError> {
        let page_count = self.renderer.page_count(bytes)?;
        let indices: Vec<usize> = (0..page_count).collect();
        let languages = self.config.ocr_languages.as_str();

        let results = run_ordered(&indices, self.config.ocr_workers, cancel, |_, &page| {
            if cancel.is_cancelled() {
                return Err(DocumentError::Cancelled);
            }
            let image = self
                .renderer
                .render_page(bytes, page, self.config.render_dpi)?;
            self.ocr.recognize(&image, languages)
        });
        if cancel.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }

        let mut texts = Vec::with_capacity(page_count);
        let mut skipped_pages = Vec::new();
        for (page, result) in results.into_iter().enumerate() {
            match result {
                Some(Ok(text)) => {
                    let text = sanitize_extracted_text(&text);
                    if !text.is_empty() {
                        texts.push(text);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(locator = %locator, page, error = %e, "Skipping page after OCR failure");
                    skipped_pages.push(page);
                }
                None => skipped_pages.push(page),
            }
        }

        if texts.is_empty() {
            tracing::warn!(locator = %locator, pages = page_count, "OCR recovered no text");
            return Err(DocumentError::NoText);
        }

        Ok(ExtractedDocument {
            locator: locator.to_string(),
            method: ExtractionMethod::Ocr,
            text: join_pages(texts.into_iter()),
            page_count,
            skipped_pages,
        })
    }
}

fn join_pages(pages: impl Iterator<Item = String>) -> String {
    pages
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_BREAK)
}

/// Concatenate extracted texts in the given (discovery) order.
pub fn join_documents(documents: &[ExtractedDocument]) -> String {
    join_pages(documents.iter().map(|d| d.text.clone()))
}
