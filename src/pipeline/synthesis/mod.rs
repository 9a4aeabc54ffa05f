pub mod insight;
pub mod prompt;

pub use insight::*;
pub use prompt::*;

use std::time::Duration;

use crate::inference::{
    clean_model_output, CompletionRequest, InferenceError, InferenceService, ResponseFormat, Stage,
};

/// Document-grounded answer generation.
pub struct Synthesizer<'a> {
    inference: &'a dyn InferenceService,
    timeout: Duration,
    answer_language: &'a str,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        inference: &'a dyn InferenceService,
        timeout: Duration,
        answer_language: &'a str,
    ) -> Self {
        Self {
            inference,
            timeout,
            answer_language,
        }
    }

    /// Answer `question` from `context` only. Tabular context (a JSON array
    /// of flat rows) gets precomputed facts in the prompt.
    pub fn synthesize(&self, question: &str, context: &str) -> Result<String, InferenceError> {
        let facts = parse_rows(context)
            .map(|rows| describe_rows(&rows))
            .unwrap_or_default();
        if !facts.is_empty() {
            tracing::debug!(facts = facts.len(), "Context is tabular, adding computed facts");
        }

        let request = CompletionRequest::new(Stage::Synthesis, ResponseFormat::Text)
            .system(build_system_prompt(self.answer_language))
            .user(build_synthesis_prompt(question, context, &facts))
            .temperature(0.3)
            .timeout(self.timeout);

        let raw = self.inference.complete(&request)?;
        let answer = clean_model_output(Stage::Synthesis, &raw)?;
        tracing::info!(chars = answer.chars().count(), "Answer synthesized");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{InferenceFailure, MockInference};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn tabular_context_gets_facts_in_prompt() {
        let mock = MockInference::new().reply(
            Stage::Synthesis,
            "Jumlah publikasi naik dari 150 (2022) menjadi 180 (2023), selisih 30 atau 20%.",
        );
        let context = r#"[{"tahun":2022,"jumlah":150},{"tahun":2023,"jumlah":180}]"#;
        let answer = Synthesizer::new(&mock, TIMEOUT, "Indonesian")
            .synthesize("bandingkan 2022 dan 2023", context)
            .unwrap();
        assert!(answer.contains("30"));

        let requests = mock.requests_for(Stage::Synthesis);
        let user = &requests[0].messages.last().unwrap().content;
        assert!(user.contains("difference +30 (absolute 30)"));
        assert!(!user.contains("2021") && !user.contains("2024"));
        assert!(requests[0].system_text().unwrap().ends_with("Answer in Indonesian."));
        assert_eq!(requests[0].format, ResponseFormat::Text);
    }

    #[test]
    fn prose_context_has_no_facts() {
        let mock =
            MockInference::new().reply(Stage::Synthesis, "  Metode yang dipakai adalah survei.  ");
        let answer = Synthesizer::new(&mock, TIMEOUT, "Indonesian")
            .synthesize("metodologi?", "Penelitian ini memakai metode survei.")
            .unwrap();
        assert_eq!(answer, "Metode yang dipakai adalah survei.");
        let requests = mock.requests();
        let user = &requests[0].messages.last().unwrap().content;
        assert!(!user.contains("COMPUTED FACTS"));
    }

    #[test]
    fn inference_failure_is_synthesis_tagged() {
        let mock = MockInference::new().fail(Stage::Synthesis, InferenceFailure::Timeout(5));
        let err = Synthesizer::new(&mock, TIMEOUT, "Indonesian")
            .synthesize("q", "teks")
            .unwrap_err();
        assert_eq!(err.stage, Stage::Synthesis);
    }

    #[test]
    fn empty_reply_is_an_error() {
        let mock = MockInference::new().reply(Stage::Synthesis, "   ");
        let err = Synthesizer::new(&mock, TIMEOUT, "Indonesian")
            .synthesize("q", "teks")
            .unwrap_err();
        assert_eq!(err.failure, InferenceFailure::EmptyResponse);
    }
}
