//! Wire shape of the query IR as produced by the builder stage.
//!
//! Keys also accept the Indonesian spellings (`tabel`, `kolom`, `nilai`, ...)
//! models tend to fall back to when prompted in Indonesian.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIr {
    #[serde(alias = "tabel")]
    pub table: String,
    #[serde(default, alias = "kolom")]
    pub columns: Vec<SelectItem>,
    #[serde(default, alias = "join", deserialize_with = "null_as_empty")]
    pub joins: Vec<Join>,
    #[serde(default, alias = "filter", deserialize_with = "null_as_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub group_by: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub having: Vec<HavingCondition>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// A SELECT entry: a column reference (`"judul"`, `"author.nama"`, `"*"`)
/// or an aggregate object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectItem {
    Column(String),
    Aggregate(AggregateColumn),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateColumn {
    #[serde(alias = "fungsi_agregasi", alias = "function")]
    pub aggregate: AggregateFn,
    #[serde(alias = "kolom")]
    pub column: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

impl TryFrom<String> for AggregateFn {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "COUNT" => Ok(Self::Count),
            "SUM" => Ok(Self::Sum),
            "AVG" | "AVERAGE" => Ok(Self::Avg),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            other => Err(format!("unsupported aggregate function: {other}")),
        }
    }
}

impl From<AggregateFn> for String {
    fn from(value: AggregateFn) -> Self {
        value.as_sql().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    #[serde(alias = "tabel")]
    pub table: String,
    pub on: String,
    #[serde(default, alias = "jenis", alias = "type")]
    pub kind: JoinKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL OUTER JOIN",
        }
    }
}

impl TryFrom<String> for JoinKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let upper = value.trim().to_ascii_uppercase();
        let words: Vec<&str> = upper
            .split_whitespace()
            .filter(|w| *w != "JOIN" && *w != "OUTER")
            .collect();
        match words.as_slice() {
            [] | ["INNER"] => Ok(Self::Inner),
            ["LEFT"] => Ok(Self::Left),
            ["RIGHT"] => Ok(Self::Right),
            ["FULL"] => Ok(Self::Full),
            _ => Err(format!("unsupported join kind: {value}")),
        }
    }
}

impl From<JoinKind> for String {
    fn from(value: JoinKind) -> Self {
        value.as_sql().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(alias = "kolom")]
    pub column: String,
    pub operator: Operator,
    #[serde(alias = "nilai")]
    pub value: FilterValue,
    #[serde(default, alias = "kondisi_gabung")]
    pub connective: Connective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    ILike,
    Like,
    In,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::ILike => "ILIKE",
            Self::Like => "LIKE",
            Self::In => "IN",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::ILike | Self::Like)
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "ILIKE" => Ok(Self::ILike),
            "LIKE" => Ok(Self::Like),
            "IN" => Ok(Self::In),
            other => Err(format!("unsupported operator: {other}")),
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_sql().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Connective {
    #[default]
    And,
    Or,
}

impl Connective {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl TryFrom<String> for Connective {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "AND" | "DAN" => Ok(Self::And),
            "OR" | "ATAU" => Ok(Self::Or),
            other => Err(format!("unsupported connective: {other}")),
        }
    }
}

impl From<Connective> for String {
    fn from(value: Connective) -> Self {
        value.as_sql().to_string()
    }
}

/// Literal or temporal-expression value of a filter or HAVING condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<FilterValue>),
    Expr { expr: String },
}

impl FilterValue {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::List(_) => "array",
            Self::Expr { .. } => "expression",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HavingCondition {
    #[serde(alias = "kolom")]
    pub column: String,
    #[serde(default, alias = "fungsi_agregasi")]
    pub aggregate: Option<AggregateFn>,
    pub operator: Operator,
    #[serde(alias = "nilai")]
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    #[serde(alias = "kolom")]
    pub column: String,
    #[serde(default, alias = "urutan")]
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "ASC" | "ASCENDING" => Ok(Self::Asc),
            "DESC" | "DESCENDING" => Ok(Self::Desc),
            other => Err(format!("unsupported sort direction: {other}")),
        }
    }
}

impl From<Direction> for String {
    fn from(value: Direction) -> Self {
        value.as_sql().to_string()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `order_by` arrives either as one object or as a list of them.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<OrderBy>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        One(OrderBy),
        Many(Vec<OrderBy>),
    }

    Ok(match Option::<Shape>::deserialize(deserializer)? {
        None => vec![],
        Some(Shape::One(order)) => vec![order],
        Some(Shape::Many(orders)) => orders,
    })
}
