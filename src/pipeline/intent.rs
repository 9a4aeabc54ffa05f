//! Question intent classification.
//!
//! The intent is advisory: it feeds the table selector's prompt and the
//! request span, but routing is decided by what the query result contains.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::inference::{
    parse_json_output, CompletionRequest, InferenceService, ResponseFormat, Stage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Who / when / how many / list.
    MetadataQuery,
    /// Summaries, methodology, conclusions: needs document text.
    ContentQuery,
    /// Comparisons, trends, rankings over structured data.
    AnalyticalQuery,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub kind: IntentKind,
    pub entities: Vec<String>,
}

impl ParsedIntent {
    /// Fallback when classification is unavailable.
    pub fn unknown(question: &str) -> Self {
        Self {
            kind: IntentKind::Unknown,
            entities: vec![question.trim().to_string()],
        }
    }
}

#[derive(Deserialize)]
struct IntentReply {
    intent: IntentKind,
    #[serde(default)]
    entities: Vec<serde_json::Value>,
}

const INTENT_SYSTEM_PROMPT: &str = "\
Classify the user's question about a research database into exactly one intent:
1. \"metadata_query\": simple structured facts (who, when, how many, list).
   Examples: \"siapa penulis terbaru?\", \"berapa publikasi 2023 di AI?\", \"daftar jurnal 2020\".
2. \"content_query\": needs the content of a document (summary, explanation, methodology, conclusion, impact).
   Examples: \"jelaskan kesimpulan X\", \"metodologi Y?\", \"ringkas laporan ini\".
3. \"analytical_query\": analysis over structured data (comparison, trend, ranking, correlation).
   Examples: \"bandingkan riset 2022-2023\", \"tren publikasi AI 5 tahun terakhir?\", \"penulis paling produktif?\".

Also list the entities the question mentions (names, titles, years, topics) as strings.
Reply ONLY with JSON: {\"intent\": \"<intent>\", \"entities\": [\"...\"]}";

/// Classify `question`. Never fails: any inference or parse problem yields
/// `IntentKind::Unknown` with the question itself as the only entity.
pub fn parse_intent(
    inference: &dyn InferenceService,
    question: &str,
    timeout: Duration,
) -> ParsedIntent {
    if question.trim().is_empty() {
        return ParsedIntent::unknown(question);
    }

    let request = CompletionRequest::new(Stage::IntentParsing, ResponseFormat::Json)
        .system(INTENT_SYSTEM_PROMPT)
        .user(format!("User question: {}", question.trim()))
        .temperature(0.0)
        .timeout(timeout);

    let reply = inference
        .complete(&request)
        .and_then(|raw| parse_json_output::<IntentReply>(Stage::IntentParsing, &raw));

    match reply {
        Ok(reply) => {
            let entities: Vec<String> = reply
                .entities
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s.trim().to_string()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect();
            let parsed = if entities.is_empty() {
                ParsedIntent {
                    kind: reply.intent,
                    entities: vec![question.trim().to_string()],
                }
            } else {
                ParsedIntent {
                    kind: reply.intent,
                    entities,
                }
            };
            tracing::info!(intent = ?parsed.kind, entities = parsed.entities.len(), "Intent parsed");
            parsed
        }
        Err(e) => {
            tracing::warn!(error = %e, "Intent parsing failed, continuing with unknown intent");
            ParsedIntent::unknown(question)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{InferenceFailure, MockInference};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn parses_intent_and_entities() {
        let mock = MockInference::new().reply(
            Stage::IntentParsing,
            r#"{"intent": "analytical_query", "entities": ["Teknologi", 2022, 2023]}"#,
        );
        let parsed = parse_intent(&mock, "Bandingkan publikasi Teknologi 2022 dan 2023", TIMEOUT);
        assert_eq!(parsed.kind, IntentKind::AnalyticalQuery);
        assert_eq!(parsed.entities, vec!["Teknologi", "2022", "2023"]);
    }

    #[test]
    fn unrecognized_intent_label_is_unknown() {
        let mock = MockInference::new()
            .reply(Stage::IntentParsing, r#"{"intent": "chitchat", "entities": ["x"]}"#);
        let parsed = parse_intent(&mock, "halo", TIMEOUT);
        assert_eq!(parsed.kind, IntentKind::Unknown);
    }

    #[test]
    fn missing_entities_fall_back_to_question() {
        let mock = MockInference::new()
            .reply(Stage::IntentParsing, r#"{"intent": "metadata_query"}"#);
        let parsed = parse_intent(&mock, "  siapa penulis terbaru?  ", TIMEOUT);
        assert_eq!(parsed.kind, IntentKind::MetadataQuery);
        assert_eq!(parsed.entities, vec!["siapa penulis terbaru?"]);
    }

    #[test]
    fn inference_failure_does_not_abort() {
        let mock = MockInference::new().fail(Stage::IntentParsing, InferenceFailure::Timeout(5));
        let parsed = parse_intent(&mock, "jelaskan metodologi", TIMEOUT);
        assert_eq!(parsed, ParsedIntent::unknown("jelaskan metodologi"));
    }

    #[test]
    fn garbage_output_does_not_abort() {
        let mock = MockInference::new().reply(Stage::IntentParsing, "I think it's metadata");
        let parsed = parse_intent(&mock, "q", TIMEOUT);
        assert_eq!(parsed.kind, IntentKind::Unknown);
    }

    #[test]
    fn blank_question_skips_inference() {
        let mock = MockInference::new();
        let parsed = parse_intent(&mock, "   ", TIMEOUT);
        assert_eq!(parsed.kind, IntentKind::Unknown);
        assert!(mock.requests().is_empty());
    }
}
