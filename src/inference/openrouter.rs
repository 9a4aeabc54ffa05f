use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, CompletionRequest, ResponseFormat};
use super::{map_transport_error, InferenceError, InferenceFailure, InferenceService};
use crate::config::APP_NAME;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenAI-compatible chat completions client for OpenRouter.
pub struct OpenRouterClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    referer: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, InferenceFailure> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| InferenceFailure::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens: 3000,
            referer: "http://localhost".to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Site URL reported to OpenRouter for attribution.
    pub fn with_referer(mut self, referer: &str) -> Self {
        self.referer = referer.to_string();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonMode>,
}

#[derive(Serialize)]
struct JsonMode {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

fn build_body<'a>(
    model: &'a str,
    max_tokens: u32,
    request: &'a CompletionRequest,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: &request.messages,
        temperature: request.temperature,
        max_tokens,
        response_format: match request.format {
            ResponseFormat::Json => Some(JsonMode { kind: "json_object" }),
            ResponseFormat::Text => None,
        },
    }
}

fn extract_text(response: ChatResponse) -> Result<String, InferenceFailure> {
    // OpenRouter reports upstream provider failures inside a 200 body.
    if let Some(error) = response.error {
        return Err(InferenceFailure::Status {
            status: error.code.unwrap_or(502),
            body: error.message,
        });
    }
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(InferenceFailure::EmptyResponse);
    }
    Ok(text)
}

impl InferenceService for OpenRouterClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let stage = request.stage;
        let url = format!("{}/chat/completions", self.base_url);
        let timeout = request
            .timeout
            .unwrap_or(Duration::from_secs(self.timeout_secs));

        tracing::debug!(stage = %stage, model = %self.model, "OpenRouter request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", APP_NAME)
            .timeout(timeout)
            .json(&build_body(&self.model, self.max_tokens, request))
            .send()
            .map_err(|e| {
                let failure = map_transport_error(e, &self.base_url, timeout.as_secs());
                InferenceError::new(stage, failure)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::new(
                stage,
                InferenceFailure::Status {
                    status: status.as_u16(),
                    body,
                },
            ));
        }

        let parsed: ChatResponse = response.json().map_err(|e| {
            InferenceError::new(stage, InferenceFailure::ResponseParsing(e.to_string()))
        })?;
        extract_text(parsed).map_err(|failure| InferenceError::new(stage, failure))
    }
}
