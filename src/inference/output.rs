//! Cleanup of raw model output before it is parsed.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use super::{InferenceError, InferenceFailure, Stage};

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
});

/// Trim the output and unwrap the first fenced code block (```json, ```sql,
/// or a bare fence). An empty body is an error for the stage.
pub fn clean_model_output(stage: Stage, raw: &str) -> Result<String, InferenceError> {
    let trimmed = raw.trim();
    let body = match FENCE_RE.captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default().trim(),
        None => trimmed,
    };
    if body.is_empty() {
        return Err(InferenceError::new(stage, InferenceFailure::EmptyResponse));
    }
    Ok(body.to_string())
}

/// Clean, then deserialize JSON output. The raw text is logged on failure and
/// never returned to callers.
pub fn parse_json_output<T: DeserializeOwned>(
    stage: Stage,
    raw: &str,
) -> Result<T, InferenceError> {
    let body = clean_model_output(stage, raw)?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(stage = %stage, error = %e, raw = %truncate(&body, 500), "Unparseable model output");
        InferenceError::malformed(stage, e.to_string())
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
