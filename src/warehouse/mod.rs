pub mod bigquery;
pub mod types;

pub use bigquery::*;
pub use types::*;

use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Warehouse is not reachable: {0}")]
    Connection(String),

    #[error("Warehouse request timed out after {0}s")]
    Timeout(u64),

    #[error("Warehouse returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Query did not complete within {0}s")]
    JobIncomplete(u64),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Lists tables and describes their columns.
pub trait SchemaCatalog: Send + Sync {
    fn list_tables(&self, dataset: &DatasetRef) -> Result<Vec<String>, WarehouseError>;

    fn get_schema(&self, dataset: &DatasetRef, table: &str) -> Result<TableSchema, WarehouseError>;
}

/// Runs one SQL text and returns its rows.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, sql: &str) -> Result<ResultSet, WarehouseError>;
}

/// Load every table schema of `dataset`. Tables whose schema cannot be read
/// are skipped with a warning; a failed listing is an error.
pub fn load_catalog(
    catalog: &dyn SchemaCatalog,
    dataset: &DatasetRef,
) -> Result<Catalog, WarehouseError> {
    let names = catalog.list_tables(dataset)?;
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        match catalog.get_schema(dataset, &name) {
            Ok(schema) => tables.push(schema),
            Err(e) => tracing::warn!(table = %name, error = %e, "Skipping table without readable schema"),
        }
    }
    tracing::debug!(dataset = %dataset, tables = tables.len(), "Catalog loaded");
    Ok(Catalog::new(tables))
}

/// In-memory warehouse for tests and offline runs.
///
/// Serves a fixed catalog and answers every query with the configured rows,
/// recording each SQL text it was asked to run.
pub struct MockWarehouse {
    tables: Vec<TableSchema>,
    rows: ResultSet,
    fail_listing: bool,
    fail_execution: Option<String>,
    broken_tables: Vec<String>,
    executed: Mutex<Vec<String>>,
}

impl MockWarehouse {
    pub fn new(tables: Vec<TableSchema>, rows: ResultSet) -> Self {
        Self {
            tables,
            rows,
            fail_listing: false,
            fail_execution: None,
            broken_tables: vec![],
            executed: Mutex::new(vec![]),
        }
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn failing_execution(mut self, message: &str) -> Self {
        self.fail_execution = Some(message.to_string());
        self
    }

    /// Schema reads for `table` fail.
    pub fn with_broken_table(mut self, table: &str) -> Self {
        self.broken_tables.push(table.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl SchemaCatalog for MockWarehouse {
    fn list_tables(&self, _dataset: &DatasetRef) -> Result<Vec<String>, WarehouseError> {
        if self.fail_listing {
            return Err(WarehouseError::Connection("mock listing failure".into()));
        }
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn get_schema(
        &self,
        _dataset: &DatasetRef,
        table: &str,
    ) -> Result<TableSchema, WarehouseError> {
        if self.broken_tables.iter().any(|t| t == table) {
            return Err(WarehouseError::Status {
                status: 403,
                body: "mock permission denied".into(),
            });
        }
        self.tables
            .iter()
            .find(|t| t.name == table)
            .cloned()
            .ok_or_else(|| WarehouseError::TableNotFound(table.to_string()))
    }
}

impl QueryExecutor for MockWarehouse {
    fn execute(&self, sql: &str) -> Result<ResultSet, WarehouseError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        match &self.fail_execution {
            Some(message) => Err(WarehouseError::QueryFailed(message.clone())),
            None => Ok(self.rows.clone()),
        }
    }
}
