pub mod builder;
pub mod prompt;
pub mod types;
pub mod validate;

pub use builder::*;
pub use types::*;
pub use validate::*;

use thiserror::Error;

use crate::inference::InferenceError;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("IR construction failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Model declined to build a query: {0}")]
    Declined(String),

    #[error("Malformed IR: {0}")]
    Malformed(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unresolvable column reference: {0}")]
    UnknownColumn(String),

    #[error("Invalid join on {table}: {reason}")]
    InvalidJoin { table: String, reason: String },

    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(String),

    #[error("Type mismatch on {column}: {reason}")]
    TypeMismatch { column: String, reason: String },

    #[error("Invalid temporal expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(u64),
}
