//! Document reference detection over query results.
//!
//! Best-effort heuristic: a string cell is a document reference when it ends
//! with a known document suffix and, unless disabled, parses as an http(s)
//! URL with a host. Nothing else about the cell or its column is consulted.

use reqwest::Url;
use serde::Serialize;

use crate::config::ScannerConfig;
use crate::warehouse::ResultSet;

/// A document locator found in a result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReference {
    pub locator: String,
    /// Index of the first row the locator appeared in.
    pub row: usize,
    pub column: String,
}

pub struct ReferenceScanner {
    suffixes: Vec<String>,
    require_network_locator: bool,
}

impl ReferenceScanner {
    pub fn new(config: &ScannerConfig) -> Self {
        let suffixes = config
            .suffixes
            .iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            suffixes,
            require_network_locator: config.require_network_locator,
        }
    }

    pub fn is_document_reference(&self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let lower = value.to_ascii_lowercase();
        if !self.suffixes.iter().any(|s| lower.ends_with(s.as_str())) {
            return false;
        }
        if !self.require_network_locator {
            return true;
        }
        match Url::parse(value) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }

    /// Row-major scan; a locator seen twice keeps its first position.
    pub fn scan(&self, results: &ResultSet) -> Vec<DocumentReference> {
        let mut found: Vec<DocumentReference> = Vec::new();
        for (row_index, row) in results.rows.iter().enumerate() {
            for (column, value) in row {
                let candidates: Vec<&str> = match value {
                    serde_json::Value::String(s) => vec![s.as_str()],
                    serde_json::Value::Array(items) => {
                        items.iter().filter_map(|v| v.as_str()).collect()
                    }
                    _ => continue,
                };
                for candidate in candidates {
                    let locator = candidate.trim();
                    if !self.is_document_reference(locator)
                        || found.iter().any(|r| r.locator == locator)
                    {
                        continue;
                    }
                    found.push(DocumentReference {
                        locator: locator.to_string(),
                        row: row_index,
                        column: column.clone(),
                    });
                }
            }
        }
        tracing::debug!(count = found.len(), rows = results.len(), "Reference scan complete");
        found
    }
}

impl Default for ReferenceScanner {
    fn default() -> Self {
        Self::new(&ScannerConfig::default())
    }
}
