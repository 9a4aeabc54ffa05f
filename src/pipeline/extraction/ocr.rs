use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::pdfium::mock_page_index;
use super::types::OcrEngine;
use super::DocumentError;

/// Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractOcr {
    tessdata_dir: Option<std::path::PathBuf>,
}

#[cfg(feature = "ocr")]
impl TesseractOcr {
    /// `None` uses Tesseract's compiled-in tessdata location.
    pub fn new(tessdata_dir: Option<&Path>) -> Result<Self, DocumentError> {
        if let Some(dir) = tessdata_dir {
            if !dir.is_dir() {
                return Err(DocumentError::TessdataNotFound(dir.to_path_buf()));
            }
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.map(Path::to_path_buf),
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractOcr {
    fn recognize(&self, image_bytes: &[u8], languages: &str) -> Result<String, DocumentError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| DocumentError::OcrInit("Invalid tessdata path".into()))?,
            ),
            None => None,
        };

        let tess = tesseract::Tesseract::new(datapath, Some(languages))
            .map_err(|e| DocumentError::OcrInit(format!("{e:?}")))?;
        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| DocumentError::OcrProcessing(format!("{e:?}")))?;
        tess.get_text()
            .map_err(|e| DocumentError::OcrProcessing(format!("{e:?}")))
    }
}

/// Stand-in used when the crate is built without the `ocr` feature. Every
/// call fails, so scanned documents degrade to per-document failures.
pub struct UnavailableOcr;

impl OcrEngine for UnavailableOcr {
    fn recognize(&self, _image_bytes: &[u8], _languages: &str) -> Result<String, DocumentError> {
        Err(DocumentError::OcrUnavailable)
    }
}

/// Narrow a `+`-joined language list to the models present in `tessdata_dir`.
///
/// Missing models are dropped with a warning; if none remain the directory is
/// unusable. Without a directory the list is returned unchanged.
pub fn resolve_languages(
    requested: &str,
    tessdata_dir: Option<&Path>,
) -> Result<String, DocumentError> {
    let languages: Vec<&str> = requested
        .split('+')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let Some(dir) = tessdata_dir else {
        return Ok(languages.join("+"));
    };

    let mut available = Vec::with_capacity(languages.len());
    for lang in languages {
        if dir.join(format!("{lang}.traineddata")).exists() {
            available.push(lang);
        } else {
            tracing::warn!(
                language = lang,
                tessdata = %dir.display(),
                "Traineddata not found, dropping OCR language"
            );
        }
    }
    if available.is_empty() {
        return Err(DocumentError::TessdataNotFound(dir.to_path_buf()));
    }
    Ok(available.join("+"))
}

/// Mock OCR engine for unit testing without Tesseract.
///
/// Pages rendered by `MockPdfBackend` are recognized by index: per-page text
/// overrides the default, and listed pages fail.
pub struct MockOcrEngine {
    text: String,
    page_text: HashMap<usize, String>,
    failing_pages: HashSet<usize>,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            page_text: HashMap::new(),
            failing_pages: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn page(mut self, index: usize, text: &str) -> Self {
        self.page_text.insert(index, text.to_string());
        self
    }

    pub fn failing_page(mut self, index: usize) -> Self {
        self.failing_pages.insert(index);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, image_bytes: &[u8], _languages: &str) -> Result<String, DocumentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match mock_page_index(image_bytes) {
            Some(index) if self.failing_pages.contains(&index) => Err(
                DocumentError::OcrProcessing(format!("mock failure on page {index}")),
            ),
            Some(index) => Ok(self
                .page_text
                .get(&index)
                .cloned()
                .unwrap_or_else(|| self.text.clone())),
            None => Ok(self.text.clone()),
        }
    }
}
