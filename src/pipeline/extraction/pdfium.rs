//! PDFium-backed text layer reads and page rasterization.
//!
//! `Pdfium` is `!Send`, so every call binds its own instance; the dynamic
//! loader keeps the library mapped after the first bind.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::{PdfPageRenderer, PdfTextExtractor};
use super::DocumentError;

const MAX_DIMENSION_PX: u32 = 4096;
const POINTS_PER_INCH: f32 = 72.0;
const LIBRARY_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

pub struct PdfiumBackend;

impl PdfiumBackend {
    /// Fails when no PDFium library can be bound. Lookup goes
    /// `PDFIUM_DYNAMIC_LIB_PATH`, then the executable's directory (and its
    /// `pdfium/`, `pdfium/lib/` children), then the system search path.
    pub fn new() -> Result<Self, DocumentError> {
        bind_pdfium().map(|_| Self)
    }
}

fn bundled_library_paths() -> Vec<PathBuf> {
    let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    else {
        return vec![];
    };
    [dir.clone(), dir.join("pdfium"), dir.join("pdfium").join("lib")]
        .iter()
        .map(|d| {
            PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
                d.to_string_lossy().as_ref(),
            ))
        })
        .collect()
}

fn bind_pdfium() -> Result<Pdfium, DocumentError> {
    if let Ok(explicit) = std::env::var(LIBRARY_ENV) {
        debug!(path = %explicit, "Binding PDFium from {LIBRARY_ENV}");
        return Pdfium::bind_to_library(&explicit)
            .map(Pdfium::new)
            .map_err(|e| DocumentError::PdfLoad(format!("cannot bind PDFium at {explicit}: {e}")));
    }

    for candidate in bundled_library_paths() {
        if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
            debug!(path = %candidate.display(), "Bound bundled PDFium");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            DocumentError::PdfLoad(format!("no PDFium library found ({LIBRARY_ENV} unset): {e}"))
        })
}

fn map_load_error(e: PdfiumError) -> DocumentError {
    let message = e.to_string();
    let lowered = message.to_lowercase();
    if ["password", "encrypt"].iter().any(|k| lowered.contains(k)) {
        DocumentError::PdfEncrypted
    } else {
        DocumentError::PdfLoad(message)
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
) -> Result<PdfDocument<'a>, DocumentError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(map_load_error)
}

/// Pixel size of a page rendered at `dpi`, shrunk to fit
/// `MAX_DIMENSION_PX` on its longest side. Never below 1x1.
fn render_size(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let width = (width_points * scale).max(1.0);
    let height = (height_points * scale).max(1.0);
    let shrink = (MAX_DIMENSION_PX as f32 / width.max(height)).min(1.0);
    let fit = |v: f32| ((v * shrink) as u32).clamp(1, MAX_DIMENSION_PX);
    (fit(width), fit(height))
}

impl PdfTextExtractor for PdfiumBackend {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, DocumentError> {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, pdf_bytes)?;
        Ok(document
            .pages()
            .iter()
            .enumerate()
            .map(|(index, page)| {
                page.text().map(|layer| layer.all()).unwrap_or_else(|e| {
                    warn!(page = index, error = %e, "Text layer unreadable");
                    String::new()
                })
            })
            .collect())
    }
}

impl PdfPageRenderer for PdfiumBackend {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, DocumentError> {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, pdf_bytes)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, DocumentError> {
        let render_error = |reason: String| DocumentError::PdfRendering {
            page: page_index,
            reason,
        };

        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, pdf_bytes)?;
        let pages = document.pages();
        let page = u16::try_from(page_index)
            .ok()
            .and_then(|index| pages.get(index).ok())
            .ok_or_else(|| {
                render_error(format!("no such page in a {}-page document", pages.len()))
            })?;

        let (width, height) = render_size(page.width().value, page.height().value, dpi);
        let bitmap = page
            .render_with_config(
                &PdfRenderConfig::new()
                    .set_target_width(width as i32)
                    .set_maximum_height(height as i32),
            )
            .map_err(|e| render_error(e.to_string()))?;

        let mut png = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| DocumentError::ImageProcessing(format!("page {page_index} to PNG: {e}")))?;
        let png = png.into_inner();

        debug!(page = page_index, width, height, bytes = png.len(), "Page rasterized");
        Ok(png)
    }
}

const MOCK_PAGE_PREFIX: &str = "mock-page-";

/// Placeholder "image" for page `index`, understood by `MockOcrEngine`.
pub fn mock_page_image(index: usize) -> Vec<u8> {
    format!("{MOCK_PAGE_PREFIX}{index}").into_bytes()
}

pub fn mock_page_index(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes)
        .ok()?
        .strip_prefix(MOCK_PAGE_PREFIX)?
        .parse()
        .ok()
}

/// PDF backend with a fixed text layer per page, for tests that must not
/// need the PDFium binary.
pub struct MockPdfBackend {
    pages: Vec<String>,
    unreadable: bool,
    failing_renders: HashSet<usize>,
}

impl MockPdfBackend {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            unreadable: false,
            failing_renders: HashSet::new(),
        }
    }

    /// Every operation fails as if the PDF were corrupt.
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::new(&[])
        }
    }

    pub fn failing_render(mut self, index: usize) -> Self {
        self.failing_renders.insert(index);
        self
    }

    fn check_readable(&self) -> Result<(), DocumentError> {
        if self.unreadable {
            Err(DocumentError::PdfLoad("mock: corrupt PDF".into()))
        } else {
            Ok(())
        }
    }
}

impl PdfTextExtractor for MockPdfBackend {
    fn extract_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, DocumentError> {
        self.check_readable()?;
        Ok(self.pages.clone())
    }
}

impl PdfPageRenderer for MockPdfBackend {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, DocumentError> {
        self.check_readable()?;
        Ok(self.pages.len())
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, DocumentError> {
        self.check_readable()?;
        if page_index >= self.pages.len() || self.failing_renders.contains(&page_index) {
            return Err(DocumentError::PdfRendering {
                page: page_index,
                reason: "mock render failure".into(),
            });
        }
        Ok(mock_page_image(page_index))
    }
}
