use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;

use super::types::DocumentFetcher;
use super::DocumentError;
use crate::cancel::CancelToken;
use crate::config::{APP_NAME, APP_VERSION};

const CHUNK_SIZE: usize = 64 * 1024;

/// Fetches documents over HTTP(S) with a per-call timeout and a size cap.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(max_bytes: u64) -> Result<Self, DocumentError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()
            .map_err(|e| DocumentError::Fetch {
                locator: String::new(),
                reason: format!("HTTP client construction failed: {e}"),
            })?;
        Ok(Self { client, max_bytes })
    }
}

fn map_request_error(e: reqwest::Error, locator: &str, timeout: Duration) -> DocumentError {
    if e.is_timeout() {
        DocumentError::Timeout {
            locator: locator.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else if e.is_connect() {
        DocumentError::Fetch {
            locator: locator.to_string(),
            reason: "could not connect".into(),
        }
    } else {
        DocumentError::Fetch {
            locator: locator.to_string(),
            reason: e.to_string(),
        }
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch(
        &self,
        locator: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, DocumentError> {
        if cancel.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }

        let mut response = self
            .client
            .get(locator)
            .timeout(timeout)
            .send()
            .map_err(|e| map_request_error(e, locator, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocumentError::HttpStatus {
                locator: locator.to_string(),
                status: status.as_u16(),
            });
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(DocumentError::TooLarge { limit: self.max_bytes });
            }
        }

        let mut body = Vec::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(locator = %locator, "Fetch cancelled mid-body");
                return Err(DocumentError::Cancelled);
            }
            let read = response.read(&mut chunk).map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    DocumentError::Timeout {
                        locator: locator.to_string(),
                        timeout_secs: timeout.as_secs(),
                    }
                } else {
                    DocumentError::Fetch {
                        locator: locator.to_string(),
                        reason: format!("body read failed: {e}"),
                    }
                }
            })?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
            if body.len() as u64 > self.max_bytes {
                return Err(DocumentError::TooLarge { limit: self.max_bytes });
            }
        }

        tracing::debug!(locator = %locator, bytes = body.len(), "Document fetched");
        Ok(body)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Serves canned bodies or failures by locator. Unknown locators get a 404.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<Vec<u8>, DocumentError>>,
    cancel_on_fetch: Option<CancelToken>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, locator: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(locator.to_string(), Ok(body.into()));
        self
    }

    pub fn failure(mut self, locator: &str, error: DocumentError) -> Self {
        self.responses.insert(locator.to_string(), Err(error));
        self
    }

    /// Raise `token` on the first fetch, as if the caller gave up mid-request.
    pub fn cancelling(mut self, token: CancelToken) -> Self {
        self.cancel_on_fetch = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DocumentFetcher for MockFetcher {
    fn fetch(
        &self,
        locator: &str,
        _timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, DocumentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(locator.to_string());
        }
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        if cancel.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }
        self.responses
            .get(locator)
            .cloned()
            .unwrap_or_else(|| {
                Err(DocumentError::HttpStatus {
                    locator: locator.to_string(),
                    status: 404,
                })
            })
    }
}
