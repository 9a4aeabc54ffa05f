pub mod compile;
pub mod dialect;

pub use compile::*;
pub use dialect::*;

use serde::Serialize;
use thiserror::Error;

use crate::config::Dialect;
use crate::warehouse::DatasetRef;

#[derive(Error, Debug, PartialEq)]
pub enum SqlGenerationError {
    #[error("No SELECT clause could be produced")]
    NoSelectClause,

    #[error("GROUP BY cannot be satisfied: every selected column is neither grouped nor aggregated")]
    GroupByUnsatisfiable,
}

/// Where and in which flavour compiled queries run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    pub namespace: DatasetRef,
    pub dialect: Dialect,
}

impl QueryTarget {
    pub fn new(namespace: DatasetRef, dialect: Dialect) -> Self {
        Self { namespace, dialect }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableAlias {
    pub table: String,
    pub alias: String,
}

/// Final query text plus the alias assignment used to produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub text: String,
    pub aliases: Vec<TableAlias>,
}

impl CompiledQuery {
    pub fn alias_of(&self, table: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|a| a.table.eq_ignore_ascii_case(table))
            .map(|a| a.alias.as_str())
    }
}
