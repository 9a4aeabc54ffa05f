/// Content category determined from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
    Unsupported,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "plain_text",
            Self::Unsupported => "unsupported",
        }
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Sniff the format from the bytes themselves; the locator's suffix is not
/// trusted. A UTF-8 BOM and leading whitespace before `%PDF-` are tolerated.
pub fn sniff_format(bytes: &[u8]) -> DocumentFormat {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    if body[start..].starts_with(PDF_MAGIC) {
        return DocumentFormat::Pdf;
    }
    if body.is_empty() || body.contains(&0) {
        return DocumentFormat::Unsupported;
    }
    match std::str::from_utf8(body) {
        Ok(_) => DocumentFormat::PlainText,
        Err(_) => DocumentFormat::Unsupported,
    }
}
