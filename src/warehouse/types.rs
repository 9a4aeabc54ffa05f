use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Project/dataset pair that qualifies every table name in compiled queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub project: String,
    pub dataset: String,
}

impl DatasetRef {
    pub fn new(project: &str, dataset: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

/// Broad type family of a warehouse column, used for literal typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Numeric,
    Bool,
    Date,
    DateTime,
    Timestamp,
    Time,
    Other,
}

impl ColumnKind {
    /// Map a BigQuery or PostgreSQL type name to its family.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        // Parameterized types: STRING(20), NUMERIC(10, 2), VARCHAR(255)
        let base = upper.split('(').next().unwrap_or_default().trim();
        match base {
            "STRING" | "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "CHAR" | "CHARACTER" | "BPCHAR"
            | "CITEXT" | "UUID" => Self::Text,
            "INT64" | "INTEGER" | "INT" | "SMALLINT" | "BIGINT" | "TINYINT" | "BYTEINT" | "INT2"
            | "INT4" | "INT8" => Self::Integer,
            "FLOAT64" | "FLOAT" | "DOUBLE PRECISION" | "REAL" | "FLOAT4" | "FLOAT8" => Self::Float,
            "NUMERIC" | "BIGNUMERIC" | "DECIMAL" | "BIGDECIMAL" => Self::Numeric,
            "BOOL" | "BOOLEAN" => Self::Bool,
            "DATE" => Self::Date,
            "DATETIME" | "TIMESTAMP WITHOUT TIME ZONE" => Self::DateTime,
            "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => Self::Timestamp,
            "TIME" => Self::Time,
            _ => Self::Other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Numeric)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Timestamp)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnSchema {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_type_name(&self.data_type)
    }
}

/// Table name plus its columns in warehouse order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(col, ty)| ColumnSchema::new(col, ty))
                .collect(),
        }
    }

    /// Column lookup; warehouse identifiers are case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// An identifier-suffixed column that points at another table of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references: String,
}

/// Every table schema of one dataset, with relation inference on top.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableSchema>,
}

impl Catalog {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Keep only the named tables, in the order given. Unknown names are ignored.
    pub fn restrict(&self, names: &[String]) -> Catalog {
        let mut seen = BTreeSet::new();
        let tables = names
            .iter()
            .filter_map(|n| self.table(n))
            .filter(|t| seen.insert(t.name.to_ascii_lowercase()))
            .cloned()
            .collect();
        Catalog { tables }
    }

    /// Foreign keys of `table`, inferred from `id_<x>` / `<x>_id` column names
    /// where `<x>` (or `<x>s`) is another table of this catalog.
    pub fn foreign_keys(&self, table: &str) -> Vec<ForeignKey> {
        let Some(schema) = self.table(table) else {
            return vec![];
        };
        schema
            .columns
            .iter()
            .filter_map(|c| {
                let target = referenced_stem(&c.name)?;
                let referenced = self.tables.iter().find(|t| {
                    !t.name.eq_ignore_ascii_case(&schema.name)
                        && (t.name.eq_ignore_ascii_case(&target)
                            || t.name.eq_ignore_ascii_case(&format!("{target}s")))
                })?;
                Some(ForeignKey {
                    column: c.name.clone(),
                    references: referenced.name.clone(),
                })
            })
            .collect()
    }

    /// Foreign key behind `table.column`, if that column is one.
    pub fn foreign_key(&self, table: &str, column: &str) -> Option<ForeignKey> {
        self.foreign_keys(table)
            .into_iter()
            .find(|fk| fk.column.eq_ignore_ascii_case(column))
    }

    /// Tables directly referenced from `table`, de-duplicated, in column order.
    pub fn links(&self, table: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for fk in self.foreign_keys(table) {
            if !out.contains(&fk.references) {
                out.push(fk.references);
            }
        }
        out
    }

    /// A junction/detail table links to two or more dimension tables.
    pub fn is_junction(&self, table: &str) -> bool {
        self.links(table).len() >= 2
    }

    /// Schema rendering handed to the generative stages:
    /// `{ "table": [ {"name": .., "type": ..}, .. ], .. }` in catalog order.
    pub fn to_prompt_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for table in &self.tables {
            map.insert(
                table.name.clone(),
                serde_json::to_value(&table.columns).unwrap_or_default(),
            );
        }
        serde_json::Value::Object(map)
    }

    /// One line per foreign key: `outputs.id_author -> author`.
    pub fn relation_lines(&self) -> Vec<String> {
        self.tables
            .iter()
            .flat_map(|t| {
                self.foreign_keys(&t.name)
                    .into_iter()
                    .map(move |fk| format!("{}.{} -> {}", t.name, fk.column, fk.references))
            })
            .collect()
    }
}

fn referenced_stem(column: &str) -> Option<String> {
    let lower = column.to_ascii_lowercase();
    let stem = lower
        .strip_prefix("id_")
        .or_else(|| lower.strip_suffix("_id"))?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// One result row: column name → value, in the order the warehouse returned.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Ordered rows returned by the query executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Build from a JSON array of objects; non-object entries are skipped.
    pub fn from_json(value: serde_json::Value) -> Self {
        let rows = match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        };
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.rows).unwrap_or_else(|_| "[]".to_string())
    }
}
