pub mod fetch;
pub mod format;
pub mod ocr;
pub mod orchestrator;
pub mod pdfium;
pub mod sanitize;
pub mod types;

pub use fetch::*;
pub use format::*;
pub use ocr::*;
pub use orchestrator::*;
pub use pdfium::*;
pub use sanitize::*;
pub use types::*;

use std::path::PathBuf;

use thiserror::Error;

/// Failure scoped to a single document. Never fatal for the request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Cancelled")]
    Cancelled,

    #[error("Fetch of {locator} timed out after {timeout_secs}s")]
    Timeout { locator: String, timeout_secs: u64 },

    #[error("Fetch of {locator} failed: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("Fetch of {locator} returned HTTP {status}")]
    HttpStatus { locator: String, status: u16 },

    #[error("Document exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Unsupported document format")]
    UnsupportedFormat,

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("PDF could not be loaded: {0}")]
    PdfLoad(String),

    #[error("PDF is password protected")]
    PdfEncrypted,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR is not available in this build")]
    OcrUnavailable,

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("No text could be extracted")]
    NoText,
}
