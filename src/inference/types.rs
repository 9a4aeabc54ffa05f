use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Output mode requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Provider-enforced syntactically valid JSON.
    Json,
    Text,
}

/// One blocking generative call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub stage: Stage,
    pub messages: Vec<ChatMessage>,
    pub format: ResponseFormat,
    pub temperature: f32,
    /// Caller-imposed ceiling; `None` uses the client default.
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    pub fn new(stage: Stage, format: ResponseFormat) -> Self {
        Self {
            stage,
            messages: vec![],
            format,
            temperature: 0.0,
            timeout: None,
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Concatenated system messages, for providers with a separate system slot.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}
