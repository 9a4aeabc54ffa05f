//! Table relevance selection.
//!
//! A generative stage picks the tables a question needs. Candidates are
//! annotated with their inferred links so the model can prefer a detail
//! table plus its joins over bare dimension tables.

use std::time::Duration;

use serde::Deserialize;

use super::intent::ParsedIntent;
use crate::inference::{
    parse_json_output, CompletionRequest, InferenceService, ResponseFormat, Stage,
};
use crate::warehouse::Catalog;

const SELECTION_SYSTEM_PROMPT: &str = "\
You select the database tables needed to answer a question about research outputs.

Rules:
- Choose only from the candidate tables listed. Use the exact table names.
- A detail (junction) table holds individual records and links to dimension tables
  through identifier columns (id_<table> or <table>_id). When the question is about
  such records, or filters them by an attribute that lives in a dimension table
  (an author's name, a year, a category), select the detail table TOGETHER with the
  dimension tables it links to. Never select the dimension tables alone in that case.
- If the question needs document content (summaries, methodology, conclusions),
  include the table that holds the document links.
- If no table is relevant, return an empty list.

Reply ONLY with JSON: {\"tables\": [\"table_a\", \"table_b\"]}";

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionReply {
    Object { tables: Vec<String> },
    List(Vec<String>),
}

impl SelectionReply {
    fn into_tables(self) -> Vec<String> {
        match self {
            Self::Object { tables } | Self::List(tables) => tables,
        }
    }
}

pub struct TableSelector<'a> {
    inference: &'a dyn InferenceService,
    timeout: Duration,
}

impl<'a> TableSelector<'a> {
    pub fn new(inference: &'a dyn InferenceService, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    /// Ordered, duplicate-free subset of catalog table names relevant to
    /// `question`. Empty when the inputs are insufficient or the stage fails;
    /// the caller aborts on empty.
    pub fn select_tables(
        &self,
        question: &str,
        intent: &ParsedIntent,
        catalog: &Catalog,
        dataset_description: Option<&str>,
    ) -> Vec<String> {
        if question.trim().is_empty() || catalog.is_empty() {
            tracing::warn!(
                tables = catalog.tables().len(),
                "Insufficient input for table selection"
            );
            return vec![];
        }

        let request = CompletionRequest::new(Stage::TableSelection, ResponseFormat::Json)
            .system(SELECTION_SYSTEM_PROMPT)
            .user(build_selection_prompt(question, intent, catalog, dataset_description))
            .temperature(0.0)
            .timeout(self.timeout);

        let raw_tables = match self
            .inference
            .complete(&request)
            .and_then(|raw| parse_json_output::<SelectionReply>(Stage::TableSelection, &raw))
        {
            Ok(reply) => reply.into_tables(),
            Err(e) => {
                tracing::warn!(error = %e, "Table selection failed");
                return vec![];
            }
        };

        let mut selected: Vec<String> = Vec::new();
        for name in raw_tables {
            match catalog.table(&name) {
                Some(table) if !selected.contains(&table.name) => selected.push(table.name.clone()),
                Some(_) => {}
                None => tracing::warn!(table = %name, "Selector named an unknown table"),
            }
        }

        for junction in relation_gaps(&selected, catalog) {
            tracing::warn!(
                relation_gap = %junction,
                selected = ?selected,
                "Selection links dimension tables without their detail table"
            );
        }

        tracing::info!(tables = ?selected, "Tables selected");
        selected
    }
}

fn build_selection_prompt(
    question: &str,
    intent: &ParsedIntent,
    catalog: &Catalog,
    dataset_description: Option<&str>,
) -> String {
    let mut prompt = String::new();
    if let Some(description) = dataset_description.filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("Dataset description: {}\n\n", description.trim()));
    }
    prompt.push_str("Candidate tables:\n");
    for table in catalog.tables() {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect();
        prompt.push_str(&format!("- {} ({})", table.name, columns.join(", ")));
        let links = catalog.links(&table.name);
        if !links.is_empty() {
            let role = if links.len() >= 2 { "detail table" } else { "links" };
            prompt.push_str(&format!(" [{role} -> {}]", links.join(", ")));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nIntent: {}\nEntities: {}\nQuestion: {}",
        serde_json::to_string(&intent.kind).unwrap_or_default().trim_matches('"'),
        intent.entities.join("; "),
        question.trim()
    ));
    prompt
}

/// Junction tables absent from `selection` although two or more of the
/// dimension tables they link are selected.
pub fn relation_gaps(selection: &[String], catalog: &Catalog) -> Vec<String> {
    catalog
        .tables()
        .iter()
        .filter(|t| catalog.is_junction(&t.name))
        .filter(|t| !selection.iter().any(|s| s.eq_ignore_ascii_case(&t.name)))
        .filter(|t| {
            catalog
                .links(&t.name)
                .iter()
                .filter(|link| selection.iter().any(|s| s.eq_ignore_ascii_case(link)))
                .count()
                >= 2
        })
        .map(|t| t.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{InferenceFailure, MockInference};
    use crate::pipeline::intent::IntentKind;
    use crate::warehouse::TableSchema;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn catalog() -> Catalog {
        Catalog::new(vec![
            TableSchema::new(
                "outputs",
                &[
                    ("id", "INT64"),
                    ("judul", "STRING"),
                    ("id_author", "INT64"),
                    ("id_tahun", "INT64"),
                    ("url_pdf", "STRING"),
                ],
            ),
            TableSchema::new("author", &[("id", "INT64"), ("nama", "STRING")]),
            TableSchema::new("tahun", &[("id", "INT64"), ("tahun", "INT64")]),
        ])
    }

    fn intent() -> ParsedIntent {
        ParsedIntent {
            kind: IntentKind::MetadataQuery,
            entities: vec!["Budi".into()],
        }
    }

    #[test]
    fn returns_known_tables_in_model_order() {
        let mock = MockInference::new().reply(
            Stage::TableSelection,
            r#"{"tables": ["outputs", "Author", "ghost", "author"]}"#,
        );
        let selector = TableSelector::new(&mock, TIMEOUT);
        let tables = selector.select_tables("judul karya Budi", &intent(), &catalog(), None);
        assert_eq!(tables, vec!["outputs", "author"]);
    }

    #[test]
    fn accepts_bare_array_reply() {
        let mock = MockInference::new().reply(Stage::TableSelection, r#"["tahun"]"#);
        let selector = TableSelector::new(&mock, TIMEOUT);
        let tables = selector.select_tables("tahun apa saja?", &intent(), &catalog(), None);
        assert_eq!(tables, vec!["tahun"]);
    }

    #[test]
    fn blank_question_or_empty_catalog_yields_empty() {
        let mock = MockInference::new().reply(Stage::TableSelection, r#"{"tables": ["outputs"]}"#);
        let selector = TableSelector::new(&mock, TIMEOUT);
        assert!(selector.select_tables("  ", &intent(), &catalog(), None).is_empty());
        assert!(selector
            .select_tables("q", &intent(), &Catalog::default(), None)
            .is_empty());
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn inference_failure_yields_empty() {
        let mock = MockInference::new().fail(Stage::TableSelection, InferenceFailure::Timeout(5));
        let selector = TableSelector::new(&mock, TIMEOUT);
        assert!(selector.select_tables("q", &intent(), &catalog(), None).is_empty());
    }

    #[test]
    fn prompt_annotates_links_and_description() {
        let mock = MockInference::new().reply(Stage::TableSelection, r#"{"tables": []}"#);
        let selector = TableSelector::new(&mock, TIMEOUT);
        let tables =
            selector.select_tables("karya Budi", &intent(), &catalog(), Some("Publikasi dosen"));
        assert!(tables.is_empty());

        let requests = mock.requests_for(Stage::TableSelection);
        let prompt = &requests[0].messages[1].content;
        assert!(prompt.starts_with("Dataset description: Publikasi dosen"));
        assert!(prompt.contains(
            "- outputs (id INT64, judul STRING, id_author INT64, id_tahun INT64, url_pdf STRING) \
             [detail table -> author, tahun]"
        ));
        assert!(prompt.contains("Intent: metadata_query"));
        assert!(prompt.contains("Question: karya Budi"));
    }

    #[test]
    fn flags_dimension_only_selection() {
        let gaps = relation_gaps(&["author".into(), "tahun".into()], &catalog());
        assert_eq!(gaps, vec!["outputs"]);
    }

    #[test]
    fn no_gap_when_detail_table_selected() {
        let selection = vec!["outputs".to_string(), "author".into(), "tahun".into()];
        assert!(relation_gaps(&selection, &catalog()).is_empty());
        assert!(relation_gaps(&["author".into()], &catalog()).is_empty());
    }
}
