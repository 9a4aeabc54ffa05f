use std::collections::HashMap;
use std::sync::Mutex;

use super::types::CompletionRequest;
use super::{InferenceError, InferenceFailure, InferenceService, Stage};

/// Scripted inference service: one canned reply (or failure) per stage.
///
/// Stages without a script fail with `EmptyResponse`. Every request is
/// recorded so tests can inspect prompts.
#[derive(Default)]
pub struct MockInference {
    replies: HashMap<Stage, Result<String, InferenceFailure>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, stage: Stage, text: &str) -> Self {
        self.replies.insert(stage, Ok(text.to_string()));
        self
    }

    pub fn fail(mut self, stage: Stage, failure: InferenceFailure) -> Self {
        self.replies.insert(stage, Err(failure));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests made for one stage, in call order.
    pub fn requests_for(&self, stage: Stage) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.stage == stage)
            .collect()
    }
}

impl InferenceService for MockInference {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.replies.get(&request.stage) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(failure)) => Err(InferenceError::new(request.stage, failure.clone())),
            None => Err(InferenceError::new(request.stage, InferenceFailure::EmptyResponse)),
        }
    }
}
