use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{DatasetRef, ResultSet, Row, TableSchema, ColumnSchema};
use super::{QueryExecutor, SchemaCatalog, WarehouseError};

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Server-side wait per `jobs.query` / `getQueryResults` call.
const SERVER_WAIT_MS: u64 = 10_000;

/// BigQuery REST v2 client used both as schema catalog and query executor.
///
/// Authenticates with a caller-supplied OAuth2 access token
/// (e.g. `gcloud auth print-access-token`).
pub struct BigQueryClient {
    base_url: String,
    project_id: String,
    access_token: String,
    location: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    max_rows: usize,
}

impl BigQueryClient {
    pub fn new(
        project_id: &str,
        access_token: &str,
        timeout_secs: u64,
    ) -> Result<Self, WarehouseError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WarehouseError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
            location: None,
            client,
            timeout_secs,
            max_rows: 10_000,
        })
    }

    /// Point at a different endpoint (emulators, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, WarehouseError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .map_err(|e| self.map_transport(e))?;
        self.parse_response(response)
    }

    fn map_transport(&self, e: reqwest::Error) -> WarehouseError {
        if e.is_connect() {
            WarehouseError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            WarehouseError::Timeout(self.timeout_secs)
        } else {
            WarehouseError::HttpClient(e.to_string())
        }
    }

    fn parse_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<T, WarehouseError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(WarehouseError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .map_err(|e| WarehouseError::ResponseParsing(e.to_string()))
    }

    fn results_query(&self, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("timeoutMs", SERVER_WAIT_MS.to_string())];
        if let Some(location) = &self.location {
            query.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        query
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Deserialize)]
struct TableResource {
    schema: Option<FieldList>,
}

#[derive(Deserialize, Default)]
struct FieldList {
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Deserialize, Clone)]
struct Field {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<Field>,
}

impl Field {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<FieldList>,
    #[serde(default)]
    rows: Vec<RawRow>,
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Deserialize)]
struct RawRow {
    #[serde(default)]
    f: Vec<RawCell>,
}

#[derive(Deserialize)]
struct RawCell {
    #[serde(default)]
    v: Value,
}

#[derive(Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

impl SchemaCatalog for BigQueryClient {
    fn list_tables(&self, dataset: &DatasetRef) -> Result<Vec<String>, WarehouseError> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base_url, dataset.project, dataset.dataset
        );
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let query: Vec<(&str, String)> = page_token
                .iter()
                .map(|t| ("pageToken", t.clone()))
                .collect();
            let page: TableList = self.get_json(&url, &query)?;
            names.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::debug!(dataset = %dataset, count = names.len(), "Listed warehouse tables");
        Ok(names)
    }

    fn get_schema(&self, dataset: &DatasetRef, table: &str) -> Result<TableSchema, WarehouseError> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.base_url, dataset.project, dataset.dataset, table
        );
        let resource: TableResource = self.get_json(&url, &[]).map_err(|e| match e {
            WarehouseError::Status { status: 404, .. } => {
                WarehouseError::TableNotFound(table.to_string())
            }
            other => other,
        })?;
        let fields = resource.schema.unwrap_or_default().fields;
        Ok(TableSchema {
            name: table.to_string(),
            columns: fields
                .iter()
                .map(|f| ColumnSchema::new(&f.name, &f.field_type))
                .collect(),
        })
    }
}

impl QueryExecutor for BigQueryClient {
    fn execute(&self, sql: &str) -> Result<ResultSet, WarehouseError> {
        let started = Instant::now();
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: SERVER_WAIT_MS,
            location: self.location.as_deref(),
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .map_err(|e| self.map_transport(e))?;
        let mut page: QueryResponse = self.parse_response(response)?;

        let mut schema: Option<Vec<Field>> = None;
        let mut rows: Vec<Row> = Vec::new();
        loop {
            if let Some(error) = page.errors.first() {
                return Err(WarehouseError::QueryFailed(error.message.clone()));
            }
            if page.job_complete {
                if schema.is_none() {
                    schema = page.schema.take().map(|s| s.fields);
                }
                let fields = schema.as_deref().unwrap_or_default();
                rows.extend(page.rows.iter().map(|r| convert_row(fields, r)));
                if rows.len() >= self.max_rows {
                    tracing::warn!(max_rows = self.max_rows, "Result truncated at row cap");
                    rows.truncate(self.max_rows);
                    break;
                }
            }
            let next_token = if page.job_complete {
                match page.page_token.take() {
                    Some(token) => Some(token),
                    None => break,
                }
            } else {
                None
            };
            if started.elapsed() > Duration::from_secs(self.timeout_secs) {
                return Err(WarehouseError::JobIncomplete(self.timeout_secs));
            }
            let job_id = page
                .job_reference
                .as_ref()
                .map(|j| j.job_id.clone())
                .ok_or_else(|| WarehouseError::ResponseParsing("missing jobReference".into()))?;
            let results_url = format!(
                "{}/projects/{}/queries/{}",
                self.base_url, self.project_id, job_id
            );
            page = self.get_json(&results_url, &self.results_query(next_token.as_deref()))?;
        }

        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(ResultSet::new(rows))
    }
}

fn convert_row(fields: &[Field], raw: &RawRow) -> Row {
    let mut row = Row::new();
    for (field, cell) in fields.iter().zip(&raw.f) {
        row.insert(field.name.clone(), convert_value(field, &cell.v));
    }
    row
}

/// BigQuery returns every scalar as a string; restore JSON types per field.
fn convert_value(field: &Field, value: &Value) -> Value {
    if field.is_repeated() {
        let scalar = Field {
            mode: None,
            ..field.clone()
        };
        return match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| convert_value(&scalar, item.get("v").unwrap_or(&Value::Null)))
                    .collect(),
            ),
            _ => Value::Array(vec![]),
        };
    }

    match (field.field_type.as_str(), value) {
        (_, Value::Null) => Value::Null,
        ("RECORD" | "STRUCT", Value::Object(obj)) => {
            let nested = RawRow {
                f: obj
                    .get("f")
                    .and_then(Value::as_array)
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|c| RawCell {
                                v: c.get("v").cloned().unwrap_or(Value::Null),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            };
            Value::Object(convert_row(&field.fields, &nested))
        }
        ("INTEGER" | "INT64", Value::String(s)) => s
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        ("FLOAT" | "FLOAT64", Value::String(s)) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        ("BOOLEAN" | "BOOL", Value::String(s)) => Value::Bool(s.eq_ignore_ascii_case("true")),
        ("TIMESTAMP", Value::String(s)) => timestamp_to_rfc3339(s)
            .map(Value::String)
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

/// TIMESTAMP cells arrive as fractional epoch seconds ("1.6725312E9").
fn timestamp_to_rfc3339(raw: &str) -> Option<String> {
    let seconds: f64 = raw.parse().ok()?;
    let micros = (seconds * 1_000_000.0).round() as i64;
    chrono::DateTime::from_timestamp_micros(micros).map(|dt| dt.to_rfc3339())
}
