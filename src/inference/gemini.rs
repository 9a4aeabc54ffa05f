use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{CompletionRequest, ResponseFormat, Role};
use super::{map_transport_error, InferenceError, InferenceFailure, InferenceService};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Generative Language API client (`models/{model}:generateContent`).
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, InferenceFailure> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| InferenceFailure::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<OwnedTextPart>,
}

#[derive(Serialize)]
struct OwnedTextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn build_body(request: &CompletionRequest) -> GenerateRequest<'_> {
    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: if m.role == Role::Assistant { "model" } else { "user" },
            parts: vec![TextPart { text: &m.content }],
        })
        .collect();
    GenerateRequest {
        contents,
        system_instruction: request.system_text().map(|text| SystemInstruction {
            parts: vec![OwnedTextPart { text }],
        }),
        generation_config: GenerationConfig {
            temperature: request.temperature,
            response_mime_type: match request.format {
                ResponseFormat::Json => "application/json",
                ResponseFormat::Text => "text/plain",
            },
        },
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, InferenceFailure> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(InferenceFailure::Blocked(reason));
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(InferenceFailure::EmptyResponse);
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return match candidate.finish_reason {
            Some(reason) if matches!(reason.as_str(), "SAFETY" | "RECITATION" | "BLOCKLIST") => {
                Err(InferenceFailure::Blocked(reason))
            }
            _ => Err(InferenceFailure::EmptyResponse),
        };
    }
    Ok(text)
}

impl InferenceService for GeminiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let stage = request.stage;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let timeout = request
            .timeout
            .unwrap_or(Duration::from_secs(self.timeout_secs));

        tracing::debug!(stage = %stage, model = %self.model, "Gemini request");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(&build_body(request))
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

        let parsed: GenerateResponse = response.json().map_err(|e| {
            InferenceError::new(stage, InferenceFailure::ResponseParsing(e.to_string()))
        })?;
        extract_text(parsed).map_err(|failure| InferenceError::new(stage, failure))
    }
}
