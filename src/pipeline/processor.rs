//! Question answering orchestrator.
//!
//! Drives one question through every stage:
//! catalog → intent → table selection → IR → validation → compile →
//! execute → route → (fetch/extract → synthesize).
//!
//! Every collaborator is injected as a trait object, so the whole flow runs
//! against mocks in tests.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use super::compiler::{compile, QueryTarget, SqlGenerationError};
use super::extraction::{
    join_documents, DocumentExtractor, HttpFetcher, OcrEngine, PdfiumBackend, UnavailableOcr,
};
use super::intent::parse_intent;
use super::ir::{validate_scoped, IrBuilder, IrError};
use super::references::ReferenceScanner;
use super::router::{route, AbortReason, AnswerResult, Route};
use super::selection::TableSelector;
use super::synthesis::Synthesizer;
use crate::cancel::CancelToken;
use crate::config::{AppConfig, Dialect};
use crate::inference::{client_from_config, InferenceError, InferenceService};
use crate::warehouse::{
    load_catalog, BigQueryClient, DatasetRef, QueryExecutor, SchemaCatalog, WarehouseError,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Schema catalog unavailable: {0}")]
    Schema(WarehouseError),

    #[error("Dataset has no readable tables")]
    EmptyCatalog,

    #[error("No relevant tables selected")]
    NoRelevantTables,

    #[error("IR rejected: {0}")]
    Ir(#[from] IrError),

    #[error("SQL generation failed: {0}")]
    SqlGeneration(#[from] SqlGenerationError),

    #[error("Query execution failed: {0}")]
    Execution(WarehouseError),

    #[error("No content extracted from {attempted} document(s)")]
    NoContentExtracted { attempted: usize },

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] InferenceError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Pipeline setup failed: {0}")]
    Setup(String),
}

impl PipelineError {
    pub fn abort_reason(&self) -> AbortReason {
        match self {
            Self::EmptyQuestion => AbortReason::EmptyQuestion,
            Self::Schema(_) | Self::EmptyCatalog | Self::Setup(_) => AbortReason::SchemaUnavailable,
            Self::NoRelevantTables => AbortReason::NoRelevantTables,
            Self::Ir(_) | Self::SqlGeneration(_) => AbortReason::QueryNotProduced,
            Self::Execution(_) => AbortReason::ExecutionFailed,
            Self::NoContentExtracted { .. } => AbortReason::NoContentExtracted,
            Self::Synthesis(_) => AbortReason::AnswerNotProduced,
            Self::Cancelled => AbortReason::Cancelled,
        }
    }
}

pub struct Pipeline {
    catalog: Arc<dyn SchemaCatalog>,
    executor: Arc<dyn QueryExecutor>,
    inference: Arc<dyn InferenceService>,
    extractor: DocumentExtractor,
    scanner: ReferenceScanner,
    target: QueryTarget,
    inference_timeout: Duration,
    answer_language: String,
    dataset_description: Option<String>,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        executor: Arc<dyn QueryExecutor>,
        inference: Arc<dyn InferenceService>,
        extractor: DocumentExtractor,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog,
            executor,
            inference,
            extractor,
            scanner: ReferenceScanner::new(&config.scanner),
            target: QueryTarget::new(
                DatasetRef::new(&config.warehouse.project_id, &config.warehouse.dataset_id),
                config.warehouse.dialect,
            ),
            inference_timeout: Duration::from_secs(config.inference.timeout_secs),
            answer_language: config.inference.answer_language.clone(),
            dataset_description: config.dataset_description.clone(),
        }
    }

    /// Build every real collaborator from configuration.
    ///
    /// Only BigQuery has a built-in catalog/executor; other dialects need
    /// their collaborators injected through `Pipeline::new`.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let warehouse = &config.warehouse;
        let bigquery = match warehouse.dialect {
            Dialect::BigQuery => {
                let token = warehouse
                    .access_token
                    .as_deref()
                    .ok_or_else(|| {
                        PipelineError::Setup("BIGQUERY_ACCESS_TOKEN is not set".into())
                    })?;
                Arc::new(
                    BigQueryClient::new(&warehouse.project_id, token, warehouse.timeout_secs)
                        .map_err(|e| PipelineError::Setup(e.to_string()))?
                        .with_location(warehouse.location.clone())
                        .with_max_rows(warehouse.max_rows),
                )
            }
            Dialect::Postgres => {
                return Err(PipelineError::Setup(
                    "no built-in executor for the postgres dialect".into(),
                ))
            }
        };

        let inference: Arc<dyn InferenceService> = Arc::from(
            client_from_config(&config.inference).map_err(|e| PipelineError::Setup(e.to_string()))?,
        );

        let mut extraction = config.extraction.clone();
        let ocr = build_ocr(&mut extraction);
        let fetcher = HttpFetcher::new(extraction.max_document_bytes)
            .map_err(|e| PipelineError::Setup(e.to_string()))?;
        let pdf = Arc::new(PdfiumBackend::new().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "PDFium unavailable, PDF documents will fail to extract");
            PdfiumBackend
        }));
        let extractor =
            DocumentExtractor::new(Arc::new(fetcher), pdf.clone(), pdf, ocr, extraction);

        tracing::info!(
            project = %warehouse.project_id,
            dataset = %warehouse.dataset_id,
            dialect = ?warehouse.dialect,
            "Pipeline ready"
        );
        Ok(Self::new(bigquery.clone(), bigquery, inference, extractor, config))
    }

    pub fn answer_question(&self, question: &str) -> AnswerResult {
        self.answer_question_with_cancel(question, &CancelToken::new())
    }

    /// Answer `question`, giving up as soon as `cancel` is raised. Always
    /// yields exactly one `AnswerResult`.
    pub fn answer_question_with_cancel(
        &self,
        question: &str,
        cancel: &CancelToken,
    ) -> AnswerResult {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("answer_question", request_id = %request_id);
        let _guard = span.enter();

        match self.run(question, cancel) {
            Ok(answer) => answer,
            Err(e) => {
                let reason = e.abort_reason();
                tracing::warn!(error = %e, reason = ?reason, "Request aborted");
                AnswerResult::AbortedAnswer(reason)
            }
        }
    }

    fn check(&self, cancel: &CancelToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn run(&self, question: &str, cancel: &CancelToken) -> Result<AnswerResult, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        tracing::info!(question = %question, "Answering question");

        let catalog =
            load_catalog(&*self.catalog, &self.target.namespace).map_err(PipelineError::Schema)?;
        if catalog.is_empty() {
            return Err(PipelineError::EmptyCatalog);
        }
        self.check(cancel)?;

        let inference = &*self.inference;
        let intent = parse_intent(inference, question, self.inference_timeout);
        tracing::info!(intent = ?intent.kind, entities = ?intent.entities, "Intent parsed");
        self.check(cancel)?;

        let tables = TableSelector::new(inference, self.inference_timeout).select_tables(
            question,
            &intent,
            &catalog,
            self.dataset_description.as_deref(),
        );
        if tables.is_empty() {
            return Err(PipelineError::NoRelevantTables);
        }
        let scoped = catalog.restrict(&tables);
        self.check(cancel)?;

        let ir = IrBuilder::new(inference, self.inference_timeout).build(question, &scoped)?;
        let validated = validate_scoped(&ir, &scoped, &catalog)?;
        let compiled = compile(&validated, &self.target)?;
        tracing::info!(sql = %compiled.text, "Query compiled");
        self.check(cancel)?;

        let rows = self
            .executor
            .execute(&compiled.text)
            .map_err(PipelineError::Execution)?;
        tracing::info!(rows = rows.len(), "Query executed");
        self.check(cancel)?;

        let references = match route(&rows, &self.scanner) {
            Route::Metadata => return Ok(AnswerResult::MetadataAnswer(rows)),
            Route::Documents(references) => references,
        };

        let outcomes = self.extractor.extract_all(&references, cancel);
        self.check(cancel)?;

        let mut documents = Vec::with_capacity(outcomes.len());
        for (reference, outcome) in references.iter().zip(outcomes) {
            match outcome {
                Ok(document) => documents.push(document),
                Err(e) => tracing::warn!(locator = %reference.locator, error = %e, "Document skipped"),
            }
        }
        if documents.is_empty() {
            return Err(PipelineError::NoContentExtracted {
                attempted: references.len(),
            });
        }
        tracing::info!(
            extracted = documents.len(),
            attempted = references.len(),
            "Documents extracted"
        );

        let context = join_documents(&documents);
        let answer = Synthesizer::new(inference, self.inference_timeout, &self.answer_language)
            .synthesize(question, &context)?;
        self.check(cancel)?;
        Ok(AnswerResult::DocumentAnswer(answer))
    }
}

#[cfg(feature = "ocr")]
fn build_ocr(extraction: &mut crate::config::ExtractionConfig) -> Arc<dyn OcrEngine> {
    use super::extraction::{resolve_languages, TesseractOcr};

    let tessdata = extraction.tessdata_dir.clone();
    let engine = resolve_languages(&extraction.ocr_languages, tessdata.as_deref()).and_then(
        |languages| {
            extraction.ocr_languages = languages;
            TesseractOcr::new(tessdata.as_deref())
        },
    );
    match engine {
        Ok(engine) => {
            tracing::info!(languages = %extraction.ocr_languages, "Tesseract OCR ready");
            Arc::new(engine)
        }
        Err(e) => {
            tracing::warn!(error = %e, "OCR unavailable, scanned documents will fail to extract");
            Arc::new(UnavailableOcr)
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn build_ocr(_extraction: &mut crate::config::ExtractionConfig) -> Arc<dyn OcrEngine> {
    tracing::info!("Built without the `ocr` feature, OCR fallback disabled");
    Arc::new(UnavailableOcr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionConfig, InferenceConfig, WarehouseConfig};
    use crate::inference::{InferenceFailure, MockInference, Stage};
    use crate::pipeline::extraction::{DocumentError, MockFetcher, MockOcrEngine, MockPdfBackend};
    use crate::warehouse::{MockWarehouse, ResultSet, TableSchema};
    use serde_json::json;

    const PDF_TEXT: &str = "Penelitian ini menggunakan metode survei kuantitatif terhadap 400 responden \
                            di lima provinsi untuk mengukur literasi digital masyarakat pedesaan.";

    const IR_REPLY: &str = r#"{
        "table": "outputs",
        "columns": ["judul", "url_pdf", "author.nama"],
        "joins": [{"table": "author", "on": "outputs.id_author = author.id"}],
        "filters": [{"column": "author.nama", "operator": "ILIKE", "value": "budi"}]
    }"#;

    fn tables() -> Vec<TableSchema> {
        vec![
            TableSchema::new(
                "outputs",
                &[
                    ("id", "INT64"),
                    ("judul", "STRING"),
                    ("id_author", "INT64"),
                    ("url_pdf", "STRING"),
                ],
            ),
            TableSchema::new("author", &[("id", "INT64"), ("nama", "STRING")]),
            TableSchema::new("tahun", &[("id", "INT64"), ("tahun", "INT64")]),
        ]
    }

    fn config() -> AppConfig {
        AppConfig {
            warehouse: WarehouseConfig {
                project_id: "riset".into(),
                dataset_id: "publikasi".into(),
                ..WarehouseConfig::default()
            },
            inference: InferenceConfig::default(),
            extraction: ExtractionConfig::default(),
            ..AppConfig::default()
        }
    }

    fn scripted(ir: &str) -> MockInference {
        MockInference::new()
            .reply(Stage::IntentParsing, r#"{"intent": "content_query", "entities": ["Budi"]}"#)
            .reply(Stage::TableSelection, r#"{"tables": ["outputs", "author"]}"#)
            .reply(Stage::IrBuilding, ir)
            .reply(Stage::Synthesis, "Penelitian Budi memakai metode survei.")
    }

    struct Harness {
        pipeline: Pipeline,
        warehouse: Arc<MockWarehouse>,
        inference: Arc<MockInference>,
        ocr: Arc<MockOcrEngine>,
    }

    fn harness(
        warehouse: MockWarehouse,
        inference: MockInference,
        fetcher: MockFetcher,
    ) -> Harness {
        let warehouse = Arc::new(warehouse);
        let inference = Arc::new(inference);
        let ocr = Arc::new(MockOcrEngine::new("teks hasil OCR"));
        let backend = Arc::new(MockPdfBackend::new(&[PDF_TEXT]));
        let extractor = DocumentExtractor::new(
            Arc::new(fetcher),
            backend.clone(),
            backend,
            ocr.clone(),
            ExtractionConfig::default(),
        );
        let pipeline = Pipeline::new(
            warehouse.clone(),
            warehouse.clone(),
            inference.clone(),
            extractor,
            &config(),
        );
        Harness {
            pipeline,
            warehouse,
            inference,
            ocr,
        }
    }

    fn document_rows() -> ResultSet {
        ResultSet::from_json(json!([
            {"judul": "A", "url_pdf": "https://repo.example.ac.id/a.pdf", "nama": "Budi"},
            {"judul": "B", "url_pdf": "https://repo.example.ac.id/b.pdf", "nama": "Budi"},
            {"judul": "C", "url_pdf": "https://repo.example.ac.id/c.pdf", "nama": "Budi"}
        ]))
    }

    #[test]
    fn rows_without_documents_are_a_metadata_answer() {
        let rows = ResultSet::from_json(json!([{"judul": "A", "nama": "Budi Santoso"}]));
        let h = harness(
            MockWarehouse::new(tables(), rows.clone()),
            scripted(IR_REPLY),
            MockFetcher::new(),
        );
        let answer = h.pipeline.answer_question("judul karya Budi");
        assert_eq!(answer, AnswerResult::MetadataAnswer(rows));

        let executed = h.warehouse.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("FROM `riset.publikasi.outputs` AS t1"));
        assert!(executed[0]
            .contains("INNER JOIN `riset.publikasi.author` AS t2 ON t1.`id_author` = t2.`id`"));
        assert!(executed[0].contains("LOWER(t2.`nama`) LIKE LOWER('%budi%')"));
        assert!(h.inference.requests_for(Stage::Synthesis).is_empty());
    }

    #[test]
    fn one_failed_fetch_still_answers_from_the_others() {
        let fetcher = MockFetcher::new()
            .document("https://repo.example.ac.id/a.pdf", b"%PDF-1.7 a".to_vec())
            .failure(
                "https://repo.example.ac.id/b.pdf",
                DocumentError::HttpStatus {
                    locator: "https://repo.example.ac.id/b.pdf".into(),
                    status: 500,
                },
            )
            .document(
                "https://repo.example.ac.id/c.pdf",
                "Dokumen C menyimpulkan literasi meningkat.".as_bytes().to_vec(),
            );
        let h = harness(
            MockWarehouse::new(tables(), document_rows()),
            scripted(IR_REPLY),
            fetcher,
        );

        let answer = h.pipeline.answer_question("apa metodologi penelitian Budi?");
        assert_eq!(
            answer,
            AnswerResult::DocumentAnswer("Penelitian Budi memakai metode survei.".into())
        );

        let synthesis = h.inference.requests_for(Stage::Synthesis);
        assert_eq!(synthesis.len(), 1);
        let prompt = &synthesis[0].messages.last().unwrap().content;
        let a = prompt.find("metode survei kuantitatif").unwrap();
        let c = prompt.find("Dokumen C menyimpulkan").unwrap();
        assert!(a < c, "documents must keep discovery order");
        assert_eq!(h.ocr.calls(), 0);
    }

    #[test]
    fn no_extracted_document_aborts_with_distinct_reason() {
        let h = harness(
            MockWarehouse::new(tables(), document_rows()),
            scripted(IR_REPLY),
            MockFetcher::new(),
        );
        let answer = h.pipeline.answer_question("ringkas penelitian Budi");
        assert_eq!(answer, AnswerResult::AbortedAnswer(AbortReason::NoContentExtracted));
        assert!(h.inference.requests_for(Stage::Synthesis).is_empty());
    }

    #[test]
    fn empty_selection_aborts() {
        let inference = scripted(IR_REPLY).reply(Stage::TableSelection, r#"{"tables": []}"#);
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default()),
            inference,
            MockFetcher::new(),
        );
        assert_eq!(
            h.pipeline.answer_question("cuaca besok?"),
            AnswerResult::AbortedAnswer(AbortReason::NoRelevantTables)
        );
        assert!(h.inference.requests_for(Stage::IrBuilding).is_empty());
    }

    #[test]
    fn malformed_ir_never_reaches_the_executor() {
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default()),
            scripted(r#"{"columns": ["judul"]}"#),
            MockFetcher::new(),
        );
        assert_eq!(
            h.pipeline.answer_question("judul karya Budi"),
            AnswerResult::AbortedAnswer(AbortReason::QueryNotProduced)
        );
        assert!(h.warehouse.executed().is_empty());
    }

    #[test]
    fn text_filter_on_identifier_column_is_rejected() {
        let ir = r#"{"table": "outputs", "columns": ["judul"],
                     "filters": [{"column": "id_author", "operator": "=", "value": "Budi"}]}"#;
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default()),
            scripted(ir),
            MockFetcher::new(),
        );
        assert_eq!(
            h.pipeline.answer_question("karya Budi"),
            AnswerResult::AbortedAnswer(AbortReason::QueryNotProduced)
        );
        assert!(h.warehouse.executed().is_empty());
    }

    #[test]
    fn identifier_filter_is_rejected_when_dimension_table_was_not_selected() {
        let tables = vec![
            TableSchema::new("outputs", &[("judul", "STRING"), ("id_author", "STRING")]),
            TableSchema::new("author", &[("id", "STRING"), ("nama", "STRING")]),
        ];
        let ir = r#"{"table": "outputs", "columns": ["judul"],
                     "filters": [{"column": "id_author", "operator": "ILIKE", "value": "budi"}]}"#;
        let inference = scripted(ir).reply(Stage::TableSelection, r#"{"tables": ["outputs"]}"#);
        let h = harness(
            MockWarehouse::new(tables, ResultSet::default()),
            inference,
            MockFetcher::new(),
        );

        assert_eq!(
            h.pipeline.answer_question("judul karya Budi"),
            AnswerResult::AbortedAnswer(AbortReason::QueryNotProduced)
        );
        assert!(h.warehouse.executed().is_empty());
    }

    #[test]
    fn ir_inference_timeout_aborts() {
        let inference = scripted(IR_REPLY).fail(Stage::IrBuilding, InferenceFailure::Timeout(60));
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default()),
            inference,
            MockFetcher::new(),
        );
        assert_eq!(
            h.pipeline.answer_question("karya Budi"),
            AnswerResult::AbortedAnswer(AbortReason::QueryNotProduced)
        );
    }

    #[test]
    fn execution_failure_aborts_without_leaking_diagnostics() {
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default())
                .failing_execution("Syntax error: Unexpected keyword at [3:1]"),
            scripted(IR_REPLY),
            MockFetcher::new(),
        );
        let answer = h.pipeline.answer_question("karya Budi");
        assert_eq!(answer, AnswerResult::AbortedAnswer(AbortReason::ExecutionFailed));
        assert!(!answer.user_text().contains("Syntax error"));
    }

    #[test]
    fn unreachable_catalog_aborts() {
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default()).failing_listing(),
            scripted(IR_REPLY),
            MockFetcher::new(),
        );
        assert_eq!(
            h.pipeline.answer_question("karya Budi"),
            AnswerResult::AbortedAnswer(AbortReason::SchemaUnavailable)
        );
        assert!(h.inference.requests().is_empty());
    }

    #[test]
    fn empty_question_makes_no_calls() {
        let h = harness(
            MockWarehouse::new(tables(), ResultSet::default()),
            scripted(IR_REPLY),
            MockFetcher::new(),
        );
        assert_eq!(
            h.pipeline.answer_question("   "),
            AnswerResult::AbortedAnswer(AbortReason::EmptyQuestion)
        );
        assert!(h.inference.requests().is_empty());
        assert!(h.warehouse.executed().is_empty());
    }

    #[test]
    fn synthesis_failure_aborts() {
        let inference =
            scripted(IR_REPLY).fail(Stage::Synthesis, InferenceFailure::Blocked("SAFETY".into()));
        let fetcher = MockFetcher::new()
            .document("https://repo.example.ac.id/a.pdf", b"%PDF-1.7".to_vec());
        let rows = ResultSet::from_json(json!([{"url_pdf": "https://repo.example.ac.id/a.pdf"}]));
        let h = harness(MockWarehouse::new(tables(), rows), inference, fetcher);
        assert_eq!(
            h.pipeline.answer_question("ringkas"),
            AnswerResult::AbortedAnswer(AbortReason::AnswerNotProduced)
        );
    }

    #[test]
    fn cancellation_during_fetch_discards_partial_results() {
        let token = CancelToken::new();
        let fetcher = MockFetcher::new()
            .document("https://repo.example.ac.id/a.pdf", b"%PDF-1.7".to_vec())
            .document("https://repo.example.ac.id/c.pdf", b"teks".to_vec())
            .cancelling(token.clone());
        let h = harness(
            MockWarehouse::new(tables(), document_rows()),
            scripted(IR_REPLY),
            fetcher,
        );
        let answer = h
            .pipeline
            .answer_question_with_cancel("ringkas penelitian Budi", &token);
        assert_eq!(answer, AnswerResult::AbortedAnswer(AbortReason::Cancelled));
        assert!(h.inference.requests_for(Stage::Synthesis).is_empty());
    }

    #[test]
    fn from_config_requires_bigquery_token() {
        let err = Pipeline::from_config(&config()).err().unwrap();
        assert!(matches!(err, PipelineError::Setup(_)));
        assert_eq!(err.abort_reason(), AbortReason::SchemaUnavailable);

        let mut postgres = config();
        postgres.warehouse.dialect = Dialect::Postgres;
        assert!(matches!(Pipeline::from_config(&postgres), Err(PipelineError::Setup(_))));
    }
}
