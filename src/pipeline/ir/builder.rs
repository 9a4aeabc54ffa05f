use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::prompt::{build_ir_prompt, IR_SYSTEM_PROMPT};
use super::types::QueryIr;
use super::IrError;
use crate::inference::{
    clean_model_output, CompletionRequest, InferenceService, ResponseFormat, Stage,
};
use crate::warehouse::Catalog;

/// "top 5", "5 teratas", "10 publikasi terbaru", "latest 3"
static NUMBERED_RANKING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\btop\s+(\d{1,3})\b|\b(\d{1,3})\s+(?:\w+\s+)?(?:teratas|terbaru)\b|\b(?:latest|newest|most\s+recent)\s+(\d{1,3})\b",
    )
    .expect("valid regex")
});

/// Recency phrasing without a count means a single row.
static SINGLE_RANKING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:most\s+recent|latest|newest|terbaru|paling\s+baru)\b")
        .expect("valid regex")
});

/// Row count implied by ranking phrasing in `question`, if any.
pub fn implied_limit(question: &str) -> Option<u64> {
    if let Some(caps) = NUMBERED_RANKING_RE.captures(question) {
        let n = (1..=3)
            .filter_map(|i| caps.get(i))
            .find_map(|m| m.as_str().parse::<u64>().ok())?;
        return (n > 0).then_some(n);
    }
    SINGLE_RANKING_RE.is_match(question).then_some(1)
}

pub struct IrBuilder<'a> {
    inference: &'a dyn InferenceService,
    timeout: Duration,
}

impl<'a> IrBuilder<'a> {
    pub fn new(inference: &'a dyn InferenceService, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    /// Ask the model for an IR over `catalog` (already restricted to the
    /// selected tables). The result is unvalidated.
    pub fn build(&self, question: &str, catalog: &Catalog) -> Result<QueryIr, IrError> {
        let request = CompletionRequest::new(Stage::IrBuilding, ResponseFormat::Json)
            .system(IR_SYSTEM_PROMPT)
            .user(build_ir_prompt(question, catalog))
            .temperature(0.1)
            .timeout(self.timeout);

        let raw = self.inference.complete(&request)?;
        let body = clean_model_output(Stage::IrBuilding, &raw)?;
        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(error = %e, "IR output is not JSON");
            IrError::Malformed(e.to_string())
        })?;

        if let Some(reason) = declined_reason(&value) {
            tracing::warn!(reason = %reason, "Model declined to build IR");
            return Err(IrError::Declined(reason));
        }

        let mut ir: QueryIr = serde_json::from_value(value).map_err(|e| {
            tracing::warn!(error = %e, "IR output does not match the contract");
            IrError::Malformed(e.to_string())
        })?;

        if !ir.order_by.is_empty() && ir.limit.is_none() {
            if let Some(limit) = implied_limit(question) {
                tracing::info!(limit, "Applying limit implied by ranking phrasing");
                ir.limit = Some(limit);
            }
        }

        tracing::debug!(
            table = %ir.table,
            joins = ir.joins.len(),
            filters = ir.filters.len(),
            "IR built"
        );
        Ok(ir)
    }
}

/// `{"error": ...}` replies, with an optional `reason`.
fn declined_reason(value: &serde_json::Value) -> Option<String> {
    let obj = value.as_object()?;
    let error = obj.get("error")?;
    if error.is_null() || error == &serde_json::Value::Bool(false) {
        return None;
    }
    let reason = obj
        .get("reason")
        .and_then(|r| r.as_str())
        .or_else(|| error.as_str())
        .unwrap_or("no reason given");
    Some(reason.to_string())
}
