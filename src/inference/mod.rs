pub mod gemini;
pub mod mock;
pub mod openrouter;
pub mod output;
pub mod types;

pub use gemini::*;
pub use mock::*;
pub use openrouter::*;
pub use output::*;
pub use types::*;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{InferenceConfig, InferenceProvider};

/// Pipeline stage a generative call belongs to. Carried on every
/// inference error so logs say which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentParsing,
    TableSelection,
    IrBuilding,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IntentParsing => "intent parsing",
            Self::TableSelection => "table selection",
            Self::IrBuilding => "IR building",
            Self::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceFailure {
    #[error("inference service is not reachable at {0}")]
    Connection(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("response parsing error: {0}")]
    ResponseParsing(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("malformed output: {0}")]
    MalformedOutput(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} inference failed: {failure}")]
pub struct InferenceError {
    pub stage: Stage,
    pub failure: InferenceFailure,
}

impl InferenceError {
    pub fn new(stage: Stage, failure: InferenceFailure) -> Self {
        Self { stage, failure }
    }

    pub fn malformed(stage: Stage, detail: impl Into<String>) -> Self {
        Self::new(stage, InferenceFailure::MalformedOutput(detail.into()))
    }
}

/// Generative inference service: chat-style messages in, text out.
pub trait InferenceService: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError>;
}

/// Build the configured provider client.
pub fn client_from_config(
    config: &InferenceConfig,
) -> Result<Box<dyn InferenceService>, InferenceFailure> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let client: Box<dyn InferenceService> = match config.provider {
        InferenceProvider::Gemini => Box::new(GeminiClient::new(
            &api_key,
            &config.model,
            config.timeout_secs,
        )?),
        InferenceProvider::OpenRouter => Box::new(
            OpenRouterClient::new(&api_key, &config.model, config.timeout_secs)?
                .with_max_tokens(config.max_tokens),
        ),
    };
    tracing::info!(provider = ?config.provider, model = %config.model, "Inference client ready");
    Ok(client)
}

/// Map a transport error the way every HTTP-backed client does.
pub(crate) fn map_transport_error(
    e: reqwest::Error,
    endpoint: &str,
    timeout_secs: u64,
) -> InferenceFailure {
    if e.is_connect() {
        InferenceFailure::Connection(endpoint.to_string())
    } else if e.is_timeout() {
        InferenceFailure::Timeout(timeout_secs)
    } else {
        InferenceFailure::HttpClient(e.to_string())
    }
}
