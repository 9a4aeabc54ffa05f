//! Terminal outcomes of a question.

use serde::Serialize;

use super::references::{DocumentReference, ReferenceScanner};
use crate::warehouse::ResultSet;

/// Why a request ended without an answer. Only `user_message()` is shown to
/// the user; diagnostics stay in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    EmptyQuestion,
    SchemaUnavailable,
    NoRelevantTables,
    QueryNotProduced,
    ExecutionFailed,
    NoContentExtracted,
    AnswerNotProduced,
    Cancelled,
}

impl AbortReason {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "Pertanyaan kosong. Silakan ajukan pertanyaan.",
            Self::SchemaUnavailable => "Maaf, struktur data tidak dapat diakses saat ini. Silakan coba lagi nanti.",
            Self::NoRelevantTables => "Maaf, tidak ada data yang sesuai dengan pertanyaan tersebut.",
            Self::QueryNotProduced => "Maaf, saya tidak dapat membuat query SQL untuk pertanyaan tersebut.",
            Self::ExecutionFailed => "Maaf, query tidak dapat dijalankan. Silakan ubah pertanyaan Anda.",
            Self::NoContentExtracted => "Gagal mengekstrak konten dari dokumen. Silakan periksa URL atau format file.",
            Self::AnswerNotProduced => "Maaf, jawaban tidak dapat disusun dari dokumen yang ditemukan.",
            Self::Cancelled => "Permintaan dibatalkan.",
        }
    }
}

/// Exactly one of these is returned per question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerResult {
    /// Query rows as-is; no document reference was found.
    MetadataAnswer(ResultSet),
    /// Answer synthesized from extracted document text.
    DocumentAnswer(String),
    AbortedAnswer(AbortReason),
}

impl AnswerResult {
    /// Text for display: rows as pretty JSON, the answer, or the abort message.
    pub fn user_text(&self) -> String {
        match self {
            Self::MetadataAnswer(rows) => rows.to_pretty_json(),
            Self::DocumentAnswer(answer) => answer.clone(),
            Self::AbortedAnswer(reason) => reason.user_message().to_string(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::AbortedAnswer(_))
    }
}

/// Which path a result set takes after execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Metadata,
    Documents(Vec<DocumentReference>),
}

pub fn route(results: &ResultSet, scanner: &ReferenceScanner) -> Route {
    let references = scanner.scan(results);
    if references.is_empty() {
        tracing::info!(rows = results.len(), "No document references, returning rows");
        Route::Metadata
    } else {
        tracing::info!(documents = references.len(), "Document references found");
        Route::Documents(references)
    }
}
