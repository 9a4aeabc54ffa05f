//! Structural validation of builder output against the catalog.
//!
//! Every reference is resolved to a `(scope, column, kind)` triple and every
//! literal is typed against its column. Nothing is repaired: the first
//! violation rejects the whole IR.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::types::{
    AggregateFn, Connective, Direction, FilterValue, JoinKind, Operator, QueryIr, SelectItem,
};
use super::IrError;
use crate::warehouse::{Catalog, ColumnKind, TableSchema};

/// A column resolved to one of the in-scope tables.
/// `scope` 0 is the primary table, `i + 1` the i-th join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub scope: usize,
    pub column: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateArg {
    Star,
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateExpr {
    pub function: AggregateFn,
    pub arg: AggregateArg,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSelect {
    AllColumns { scope: usize },
    Column(ColumnRef),
    Aggregate { expr: AggregateExpr, alias: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJoin {
    pub table: String,
    pub kind: JoinKind,
    pub conditions: Vec<(ColumnRef, ColumnRef)>,
}

/// A literal typed against the column it is compared with.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Number(String),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// UTC instant.
    Timestamp(NaiveDateTime),
    Expr(String),
    List(Vec<TypedValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub target: ColumnRef,
    pub operator: Operator,
    pub value: TypedValue,
    pub connective: Connective,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HavingTarget {
    Aggregate(AggregateExpr),
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHaving {
    pub target: HavingTarget,
    pub operator: Operator,
    pub value: TypedValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Column(ColumnRef),
    Alias(String),
    Aggregate(AggregateExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub key: OrderKey,
    pub direction: Direction,
}

/// An IR whose every reference resolved against the catalog. Only this type
/// can be compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIr {
    pub(crate) tables: Vec<String>,
    pub(crate) select: Vec<ResolvedSelect>,
    pub(crate) joins: Vec<ResolvedJoin>,
    pub(crate) filters: Vec<ResolvedFilter>,
    pub(crate) group_by: Vec<ColumnRef>,
    pub(crate) having: Vec<ResolvedHaving>,
    pub(crate) order_by: Vec<ResolvedOrder>,
    pub(crate) limit: Option<u64>,
}

impl ValidatedIr {
    /// Canonical table names in alias order: primary first, then joins.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }
}

static AGGREGATE_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(COUNT|SUM|AVG|MIN|MAX)\s*\(\s*(DISTINCT\s+)?([^()]+?)\s*\)\s*$")
        .expect("valid regex")
});

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static SCOPE_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^t([1-9][0-9]*)$").expect("valid regex"));

static JOIN_AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid regex"));

static EXPR_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+\-*/(),\s]+$").expect("valid regex"));

static EXPR_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

/// Functions a temporal expression must be built from.
const TEMPORAL_FUNCTIONS: &[&str] = &[
    "CURRENT_DATE",
    "CURRENT_TIMESTAMP",
    "DATE_SUB",
    "DATE_ADD",
    "EXTRACT",
    "DATE_TRUNC",
];

/// Keywords allowed as arguments of those functions.
const TEMPORAL_KEYWORDS: &[&str] = &[
    "INTERVAL", "FROM", "YEAR", "QUARTER", "MONTH", "WEEK", "DAY", "HOUR", "MINUTE", "SECOND",
];

/// Validate `ir` against `catalog`, which is both the scope and the source of
/// foreign-key relations.
pub fn validate(ir: &QueryIr, catalog: &Catalog) -> Result<ValidatedIr, IrError> {
    validate_scoped(ir, catalog, catalog)
}

/// Validate `ir` against `scoped` (the selected tables). Foreign keys are
/// inferred over the whole `dataset`, so an identifier column stays an
/// identifier even when the table it points at was not selected.
pub fn validate_scoped(
    ir: &QueryIr,
    catalog: &Catalog,
    dataset: &Catalog,
) -> Result<ValidatedIr, IrError> {
    let primary = catalog
        .table(&ir.table)
        .ok_or_else(|| IrError::UnknownTable(ir.table.clone()))?;
    let mut scope: Vec<&TableSchema> = vec![primary];

    let mut joins = Vec::with_capacity(ir.joins.len());
    for join in &ir.joins {
        let target = catalog
            .table(&join.table)
            .ok_or_else(|| IrError::UnknownTable(join.table.clone()))?;
        if scope.iter().any(|t| t.name == target.name) {
            return Err(IrError::InvalidJoin {
                table: target.name.clone(),
                reason: "table is already in scope".into(),
            });
        }
        scope.push(target);
        let conditions = resolve_join_predicate(&join.on, &scope)?;
        joins.push(ResolvedJoin {
            table: target.name.clone(),
            kind: join.kind,
            conditions,
        });
    }

    let mut select = Vec::with_capacity(ir.columns.len());
    let mut aliases: Vec<String> = Vec::new();
    for item in &ir.columns {
        match item {
            SelectItem::Column(reference) => {
                if let Some(scope_index) = resolve_star(reference, &scope)? {
                    select.push(ResolvedSelect::AllColumns { scope: scope_index });
                } else {
                    select.push(ResolvedSelect::Column(resolve_column(reference, &scope)?));
                }
            }
            SelectItem::Aggregate(agg) => {
                let expr = resolve_aggregate(agg.aggregate, &agg.column, agg.distinct, &scope)?;
                let alias = match agg.alias.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                    Some(alias) => {
                        if !IDENTIFIER_RE.is_match(alias) {
                            return Err(IrError::InvalidAggregate(format!(
                                "alias {alias:?} is not a plain identifier"
                            )));
                        }
                        if aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
                            return Err(IrError::InvalidAggregate(format!(
                                "alias {alias:?} is used twice"
                            )));
                        }
                        alias.to_string()
                    }
                    None => generated_alias(&expr, &aliases),
                };
                aliases.push(alias.clone());
                select.push(ResolvedSelect::Aggregate { expr, alias });
            }
        }
    }

    let mut filters = Vec::with_capacity(ir.filters.len());
    for filter in &ir.filters {
        let target = resolve_column(&filter.column, &scope)?;
        let is_fk = dataset
            .foreign_key(&scope[target.scope].name, &target.column)
            .is_some();
        let value = type_filter_value(&target, is_fk, filter.operator, &filter.value)?;
        filters.push(ResolvedFilter {
            target,
            operator: filter.operator,
            value,
            connective: filter.connective,
        });
    }

    let mut group_by: Vec<ColumnRef> = Vec::with_capacity(ir.group_by.len());
    for reference in &ir.group_by {
        let column = resolve_column(reference, &scope)?;
        if !group_by.contains(&column) {
            group_by.push(column);
        }
    }

    let mut having = Vec::with_capacity(ir.having.len());
    for condition in &ir.having {
        let target = if let Some(function) = condition.aggregate {
            HavingTarget::Aggregate(resolve_aggregate(function, &condition.column, false, &scope)?)
        } else if let Some(expr) = aggregate_for_alias(&select, &condition.column) {
            HavingTarget::Aggregate(expr)
        } else if let Some(expr) = parse_aggregate_call(&condition.column, &scope)? {
            HavingTarget::Aggregate(expr)
        } else {
            let column = resolve_column(&condition.column, &scope)?;
            if !group_by.contains(&column) {
                return Err(IrError::InvalidAggregate(format!(
                    "HAVING column {} is neither grouped nor aggregated",
                    condition.column
                )));
            }
            HavingTarget::Column(column)
        };
        let value = type_having_value(
            &target,
            condition.operator,
            &condition.value,
            &condition.column,
        )?;
        having.push(ResolvedHaving {
            target,
            operator: condition.operator,
            value,
        });
    }

    let mut order_by = Vec::with_capacity(ir.order_by.len());
    for order in &ir.order_by {
        let key = if let Some(alias) = aliases
            .iter()
            .find(|a| a.eq_ignore_ascii_case(order.column.trim()))
        {
            OrderKey::Alias(alias.clone())
        } else if let Some(expr) = parse_aggregate_call(&order.column, &scope)? {
            OrderKey::Aggregate(expr)
        } else {
            OrderKey::Column(resolve_column(&order.column, &scope)?)
        };
        order_by.push(ResolvedOrder {
            key,
            direction: order.direction,
        });
    }

    if ir.limit == Some(0) {
        return Err(IrError::InvalidLimit(0));
    }

    Ok(ValidatedIr {
        tables: scope.iter().map(|t| t.name.clone()).collect(),
        select,
        joins,
        filters,
        group_by,
        having,
        order_by,
        limit: ir.limit,
    })
}

fn clean_reference(reference: &str) -> String {
    reference
        .trim()
        .chars()
        .filter(|c| *c != '`' && *c != '"')
        .collect()
}

/// Resolve a dotted or bare column reference. Bare names belong to the
/// primary table. Qualifiers may be a table name, a namespace-qualified
/// table name, or a positional alias (`t2`).
fn resolve_column(reference: &str, scope: &[&TableSchema]) -> Result<ColumnRef, IrError> {
    let cleaned = clean_reference(reference);
    let (scope_index, column_name) = match cleaned.rsplit_once('.') {
        Some((qualifier, column)) => (resolve_qualifier(qualifier, scope, reference)?, column),
        None => (0, cleaned.as_str()),
    };
    let table = scope[scope_index];
    let column = table
        .column(column_name.trim())
        .ok_or_else(|| IrError::UnknownColumn(reference.trim().to_string()))?;
    Ok(ColumnRef {
        scope: scope_index,
        column: column.name.clone(),
        kind: column.kind(),
    })
}

fn resolve_qualifier(
    qualifier: &str,
    scope: &[&TableSchema],
    reference: &str,
) -> Result<usize, IrError> {
    let table_part = qualifier.rsplit('.').next().unwrap_or(qualifier).trim();
    if let Some(index) = scope
        .iter()
        .position(|t| t.name.eq_ignore_ascii_case(table_part))
    {
        return Ok(index);
    }
    if let Some(caps) = SCOPE_ALIAS_RE.captures(table_part) {
        if let Ok(n) = caps[1].parse::<usize>() {
            if n >= 1 && n <= scope.len() {
                return Ok(n - 1);
            }
        }
    }
    Err(IrError::UnknownColumn(reference.trim().to_string()))
}

/// `*` or `table.*` in SELECT.
fn resolve_star(reference: &str, scope: &[&TableSchema]) -> Result<Option<usize>, IrError> {
    let cleaned = clean_reference(reference);
    if cleaned == "*" {
        return Ok(Some(0));
    }
    match cleaned.strip_suffix(".*") {
        Some(qualifier) => Ok(Some(resolve_qualifier(qualifier, scope, reference)?)),
        None => Ok(None),
    }
}

fn resolve_aggregate(
    function: AggregateFn,
    column: &str,
    distinct: bool,
    scope: &[&TableSchema],
) -> Result<AggregateExpr, IrError> {
    let cleaned = clean_reference(column);
    if cleaned == "*" {
        if function != AggregateFn::Count || distinct {
            return Err(IrError::InvalidAggregate(format!(
                "{}(*) is not allowed",
                function.as_sql()
            )));
        }
        return Ok(AggregateExpr {
            function,
            arg: AggregateArg::Star,
            distinct: false,
        });
    }
    let target = resolve_column(column, scope)?;
    if matches!(function, AggregateFn::Sum | AggregateFn::Avg) && !target.kind.is_numeric() {
        return Err(IrError::InvalidAggregate(format!(
            "{} requires a numeric column, {} is not",
            function.as_sql(),
            column.trim()
        )));
    }
    Ok(AggregateExpr {
        function,
        arg: AggregateArg::Column(target),
        distinct,
    })
}

/// Aggregate written inline as `COUNT(id)` / `SUM(DISTINCT t1.x)`.
fn parse_aggregate_call(
    text: &str,
    scope: &[&TableSchema],
) -> Result<Option<AggregateExpr>, IrError> {
    let Some(caps) = AGGREGATE_CALL_RE.captures(text) else {
        return Ok(None);
    };
    let function = AggregateFn::try_from(caps[1].to_string()).map_err(IrError::InvalidAggregate)?;
    let distinct = caps.get(2).is_some();
    resolve_aggregate(function, &caps[3], distinct, scope).map(Some)
}

fn aggregate_for_alias(select: &[ResolvedSelect], name: &str) -> Option<AggregateExpr> {
    select.iter().find_map(|item| match item {
        ResolvedSelect::Aggregate { expr, alias } if alias.eq_ignore_ascii_case(name.trim()) => {
            Some(expr.clone())
        }
        _ => None,
    })
}

fn generated_alias(expr: &AggregateExpr, taken: &[String]) -> String {
    let base = match &expr.arg {
        AggregateArg::Star => format!("{}_all", expr.function.as_sql().to_ascii_lowercase()),
        AggregateArg::Column(c) => format!(
            "{}_{}",
            expr.function.as_sql().to_ascii_lowercase(),
            c.column.to_ascii_lowercase()
        ),
    };
    let mut candidate = base.clone();
    let mut n = 2;
    while taken.iter().any(|t| t.eq_ignore_ascii_case(&candidate)) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    candidate
}

fn resolve_join_predicate(
    on: &str,
    scope: &[&TableSchema],
) -> Result<Vec<(ColumnRef, ColumnRef)>, IrError> {
    let joined = scope.len() - 1;
    let table = scope[joined].name.clone();
    let invalid = |reason: String| IrError::InvalidJoin {
        table: table.clone(),
        reason,
    };

    let mut conditions = Vec::new();
    for part in JOIN_AND_RE.split(on.trim()) {
        let (left, right) = part
            .split_once('=')
            .ok_or_else(|| invalid(format!("predicate {part:?} is not an equality")))?;
        if left.trim_end().ends_with(['!', '<', '>']) || right.starts_with('=') {
            return Err(invalid(format!("predicate {part:?} is not an equality")));
        }
        let left = resolve_column(left, scope)?;
        let right = resolve_column(right, scope)?;
        if left.scope == right.scope {
            return Err(invalid(format!("predicate {part:?} compares a table with itself")));
        }
        conditions.push((left, right));
    }
    if conditions.is_empty() {
        return Err(invalid("empty join predicate".into()));
    }
    if !conditions
        .iter()
        .any(|(l, r)| l.scope == joined || r.scope == joined)
    {
        return Err(invalid("predicate does not reference the joined table".into()));
    }
    Ok(conditions)
}

fn mismatch(column: &ColumnRef, reason: impl Into<String>) -> IrError {
    IrError::TypeMismatch {
        column: column.column.clone(),
        reason: reason.into(),
    }
}

fn type_filter_value(
    target: &ColumnRef,
    is_fk: bool,
    operator: Operator,
    value: &FilterValue,
) -> Result<TypedValue, IrError> {
    match operator {
        Operator::In => {
            let FilterValue::List(items) = value else {
                return Err(mismatch(target, "IN requires an array of values"));
            };
            if items.is_empty() {
                return Err(mismatch(target, "IN requires at least one value"));
            }
            let typed = items
                .iter()
                .map(|item| match item {
                    FilterValue::List(_) => Err(mismatch(target, "nested arrays are not allowed")),
                    other => type_literal(target, is_fk, other),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TypedValue::List(typed))
        }
        op if op.is_pattern() => {
            if !matches!(target.kind, ColumnKind::Text | ColumnKind::Other) {
                return Err(mismatch(target, format!("{op} applies to text columns only")));
            }
            match value {
                FilterValue::Text(s)
                    if !s
                        .trim_matches(|c: char| c == '%' || c.is_whitespace())
                        .is_empty() =>
                {
                    type_literal(target, is_fk, value)
                }
                FilterValue::Text(_) => Err(mismatch(target, "empty search text")),
                other => Err(mismatch(
                    target,
                    format!("{op} requires a string, got {}", other.describe()),
                )),
            }
        }
        op => {
            if matches!(value, FilterValue::List(_)) {
                return Err(mismatch(target, format!("{op} does not take an array")));
            }
            if op.is_ordering() && matches!(target.kind, ColumnKind::Text | ColumnKind::Bool) {
                return Err(mismatch(target, format!("{op} cannot order text or boolean columns")));
            }
            type_literal(target, is_fk, value)
        }
    }
}

fn type_literal(
    target: &ColumnRef,
    is_fk: bool,
    value: &FilterValue,
) -> Result<TypedValue, IrError> {
    let kind = target.kind;
    match value {
        FilterValue::Expr { expr } => {
            if !(kind.is_numeric() || kind.is_temporal() || kind == ColumnKind::Other) {
                return Err(mismatch(
                    target,
                    "temporal expressions apply to numeric or date columns",
                ));
            }
            validate_temporal_expr(expr)?;
            Ok(TypedValue::Expr(expr.trim().to_string()))
        }
        FilterValue::Number(n) => {
            if kind.is_numeric() || kind == ColumnKind::Other {
                Ok(TypedValue::Number(n.to_string()))
            } else {
                Err(mismatch(target, format!("{kind:?} column does not take a number")))
            }
        }
        FilterValue::Bool(b) => {
            if matches!(kind, ColumnKind::Bool | ColumnKind::Other) {
                Ok(TypedValue::Bool(*b))
            } else {
                Err(mismatch(target, format!("{kind:?} column does not take a boolean")))
            }
        }
        FilterValue::Text(s) => {
            if is_fk {
                return Err(mismatch(
                    target,
                    "identifier column compared with text; filter on the referenced table's attribute",
                ));
            }
            match kind {
                ColumnKind::Text | ColumnKind::Other | ColumnKind::Time => {
                    Ok(TypedValue::Text(s.clone()))
                }
                ColumnKind::Date => parse_date(s)
                    .map(TypedValue::Date)
                    .ok_or_else(|| mismatch(target, format!("{s:?} is not an ISO date"))),
                ColumnKind::DateTime => parse_datetime(s)
                    .map(TypedValue::DateTime)
                    .ok_or_else(|| mismatch(target, format!("{s:?} is not an ISO datetime"))),
                ColumnKind::Timestamp => parse_timestamp(s)
                    .map(TypedValue::Timestamp)
                    .ok_or_else(|| mismatch(target, format!("{s:?} is not an ISO timestamp"))),
                ColumnKind::Integer | ColumnKind::Float | ColumnKind::Numeric => Err(mismatch(
                    target,
                    "numeric column requires an unquoted number, got a string",
                )),
                ColumnKind::Bool => Err(mismatch(target, "boolean column requires true/false")),
            }
        }
        FilterValue::List(_) => Err(mismatch(target, "unexpected array")),
    }
}

fn type_having_value(
    target: &HavingTarget,
    operator: Operator,
    value: &FilterValue,
    reference: &str,
) -> Result<TypedValue, IrError> {
    match target {
        HavingTarget::Column(column) => type_filter_value(column, false, operator, value),
        HavingTarget::Aggregate(expr) => {
            if operator.is_pattern() || operator == Operator::In {
                return Err(IrError::InvalidAggregate(format!(
                    "{operator} cannot compare an aggregate ({reference})"
                )));
            }
            match (&expr.function, &expr.arg) {
                (AggregateFn::Min | AggregateFn::Max, AggregateArg::Column(column)) => {
                    type_literal(column, false, value)
                }
                _ => match value {
                    FilterValue::Number(n) => Ok(TypedValue::Number(n.to_string())),
                    _ => Err(IrError::TypeMismatch {
                        column: reference.trim().to_string(),
                        reason: format!("aggregate compared with {}", value.describe()),
                    }),
                },
            }
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| parse_datetime(s))
}

/// Accepts only arithmetic over the allowlisted temporal functions.
pub fn validate_temporal_expr(expr: &str) -> Result<(), IrError> {
    let trimmed = expr.trim();
    let reject = |reason: &str| IrError::InvalidExpression(format!("{trimmed:?}: {reason}"));

    if trimmed.is_empty() {
        return Err(reject("empty"));
    }
    if !EXPR_CHARS_RE.is_match(trimmed) {
        return Err(reject("contains quotes, semicolons or other disallowed characters"));
    }

    let mut depth: i32 = 0;
    for c in trimmed.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(reject("unbalanced parentheses"));
        }
    }
    if depth != 0 {
        return Err(reject("unbalanced parentheses"));
    }

    let mut has_function = false;
    for word in EXPR_WORD_RE.find_iter(trimmed) {
        let upper = word.as_str().to_ascii_uppercase();
        if TEMPORAL_FUNCTIONS.contains(&upper.as_str()) {
            has_function = true;
        } else if !TEMPORAL_KEYWORDS.contains(&upper.as_str()) {
            return Err(reject(&format!("{} is not an allowed keyword", word.as_str())));
        }
    }
    if !has_function {
        return Err(reject("no temporal function"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            TableSchema::new(
                "outputs",
                &[
                    ("id", "INT64"),
                    ("judul", "STRING"),
                    ("id_author", "INT64"),
                    ("id_tahun", "INT64"),
                    ("tanggal_terbit", "DATE"),
                    ("diunggah", "TIMESTAMP"),
                    ("terverifikasi", "BOOL"),
                    ("url_pdf", "STRING"),
                ],
            ),
            TableSchema::new("author", &[("id", "INT64"), ("nama", "STRING")]),
            TableSchema::new("tahun", &[("id", "INT64"), ("tahun", "INT64")]),
        ])
    }

    fn ir(value: serde_json::Value) -> QueryIr {
        serde_json::from_value(value).unwrap()
    }

    fn joined(extra: serde_json::Value) -> QueryIr {
        let mut base = json!({
            "table": "outputs",
            "columns": ["judul"],
            "joins": [
                {"table": "author", "on": "outputs.id_author = author.id"},
                {"table": "tahun", "on": "outputs.id_tahun = tahun.id"}
            ]
        });
        if let (Some(obj), serde_json::Value::Object(extra)) = (base.as_object_mut(), extra) {
            obj.extend(extra);
        }
        ir(base)
    }

    #[test]
    fn resolves_bare_and_dotted_columns() {
        let validated = validate(
            &joined(json!({"columns": ["judul", "author.nama", "`tahun`.`tahun`"]})),
            &catalog(),
        )
        .unwrap();
        assert_eq!(validated.tables(), ["outputs", "author", "tahun"]);
        let scopes: Vec<usize> = validated
            .select
            .iter()
            .map(|s| match s {
                ResolvedSelect::Column(c) => c.scope,
                _ => usize::MAX,
            })
            .collect();
        assert_eq!(scopes, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_primary_table_is_rejected() {
        let err =
            validate(&ir(json!({"table": "ghost", "columns": ["x"]})), &catalog()).unwrap_err();
        assert!(matches!(err, IrError::UnknownTable(t) if t == "ghost"));
    }

    #[test]
    fn bare_column_outside_primary_is_rejected() {
        let err = validate(&joined(json!({"columns": ["nama"]})), &catalog()).unwrap_err();
        assert!(matches!(err, IrError::UnknownColumn(c) if c == "nama"));
    }

    #[test]
    fn column_of_unjoined_table_is_rejected() {
        let err = validate(
            &ir(json!({"table": "outputs", "columns": ["author.nama"]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::UnknownColumn(_)));
    }

    #[test]
    fn positional_alias_qualifier_resolves() {
        let validated = validate(&joined(json!({"columns": ["t2.nama"]})), &catalog()).unwrap();
        assert!(matches!(&validated.select[0], ResolvedSelect::Column(c) if c.scope == 1 && c.column == "nama"));
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let err = validate(
            &ir(json!({
                "table": "outputs",
                "joins": [
                    {"table": "author", "on": "outputs.id_author = author.id"},
                    {"table": "author", "on": "outputs.id_author = author.id"}
                ]
            })),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidJoin { .. }));
    }

    #[test]
    fn join_predicate_must_reference_joined_table() {
        let err = validate(
            &ir(json!({
                "table": "outputs",
                "joins": [{"table": "author", "on": "outputs.id = outputs.id_author"}]
            })),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidJoin { .. }));
    }

    #[test]
    fn join_predicate_cannot_see_later_joins() {
        let err = validate(
            &ir(json!({
                "table": "outputs",
                "joins": [
                    {"table": "author", "on": "tahun.id = author.id"},
                    {"table": "tahun", "on": "outputs.id_tahun = tahun.id"}
                ]
            })),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::UnknownColumn(c) if c == "tahun.id"));
    }

    #[test]
    fn text_value_on_numeric_column_is_rejected() {
        let err = validate(
            &joined(json!({"filters": [{"column": "tahun.tahun", "operator": "=", "value": "2022"}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { column, .. } if column == "tahun"));
    }

    #[test]
    fn numeric_value_on_numeric_column_is_typed() {
        let validated = validate(
            &joined(json!({"filters": [{"column": "tahun.tahun", "operator": ">=", "value": 2020}]})),
            &catalog(),
        )
        .unwrap();
        assert_eq!(validated.filters[0].value, TypedValue::Number("2020".into()));
    }

    #[test]
    fn text_on_foreign_key_column_is_rejected() {
        let catalog = Catalog::new(vec![
            TableSchema::new("outputs", &[("id", "INT64"), ("id_author", "STRING")]),
            TableSchema::new("author", &[("id", "STRING"), ("nama", "STRING")]),
        ]);
        let err = validate(
            &ir(json!({
                "table": "outputs",
                "joins": [{"table": "author", "on": "outputs.id_author = author.id"}],
                "filters": [{"column": "id_author", "operator": "ILIKE", "value": "budi"}]
            })),
            &catalog,
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { column, .. } if column == "id_author"));
    }

    #[test]
    fn foreign_key_outside_selection_is_still_an_identifier() {
        let dataset = Catalog::new(vec![
            TableSchema::new("outputs", &[("judul", "STRING"), ("id_author", "STRING")]),
            TableSchema::new("author", &[("id", "STRING"), ("nama", "STRING")]),
        ]);
        let scoped = dataset.restrict(&["outputs".to_string()]);
        let query = ir(json!({
            "table": "outputs",
            "columns": ["judul"],
            "filters": [{"column": "id_author", "operator": "ILIKE", "value": "budi"}]
        }));

        assert!(validate(&query, &scoped).is_ok());
        let err = validate_scoped(&query, &scoped, &dataset).unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { column, .. } if column == "id_author"));
    }

    #[test]
    fn ordering_operator_on_text_is_rejected() {
        let err = validate(
            &ir(json!({"table": "outputs", "filters": [{"column": "judul", "operator": ">", "value": "a"}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));
    }

    #[test]
    fn like_on_numeric_column_is_rejected() {
        let err = validate(
            &ir(json!({"table": "outputs", "filters": [{"column": "id", "operator": "ILIKE", "value": "1"}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));
    }

    #[test]
    fn in_requires_non_empty_typed_list() {
        let err = validate(
            &joined(json!({"filters": [{"column": "tahun.tahun", "operator": "IN", "value": []}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));

        let err = validate(
            &joined(json!({"filters": [{"column": "tahun.tahun", "operator": "IN", "value": [2022, "2023"]}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));

        let validated = validate(
            &joined(json!({"filters": [{"column": "tahun.tahun", "operator": "IN", "value": [2022, 2023]}]})),
            &catalog(),
        )
        .unwrap();
        assert_eq!(
            validated.filters[0].value,
            TypedValue::List(vec![
                TypedValue::Number("2022".into()),
                TypedValue::Number("2023".into())
            ])
        );
    }

    #[test]
    fn temporal_columns_take_iso_strings_or_expressions() {
        let validated = validate(
            &ir(json!({"table": "outputs", "filters": [
                {"column": "tanggal_terbit", "operator": ">=", "value": "2023-01-01"},
                {"column": "diunggah", "operator": "<", "value": "2024-03-01T08:00:00+07:00"},
                {"column": "tanggal_terbit", "operator": ">=", "value": {"expr": "DATE_SUB(CURRENT_DATE(), INTERVAL 5 YEAR)"}}
            ]})),
            &catalog(),
        )
        .unwrap();
        assert_eq!(
            validated.filters[0].value,
            TypedValue::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
        );
        assert_eq!(
            validated.filters[1].value,
            TypedValue::Timestamp(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(1, 0, 0).unwrap()
            )
        );
        assert!(matches!(validated.filters[2].value, TypedValue::Expr(_)));

        let err = validate(
            &ir(json!({"table": "outputs", "filters": [{"column": "tanggal_terbit", "operator": "=", "value": "kemarin"}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));
    }

    #[test]
    fn bool_column_takes_bool() {
        assert!(validate(
            &ir(json!({"table": "outputs", "filters": [{"column": "terverifikasi", "operator": "=", "value": true}]})),
            &catalog(),
        )
        .is_ok());
        assert!(validate(
            &ir(json!({"table": "outputs", "filters": [{"column": "terverifikasi", "operator": "=", "value": 1}]})),
            &catalog(),
        )
        .is_err());
    }

    #[test]
    fn expression_allowlist() {
        assert!(validate_temporal_expr("CURRENT_DATE()").is_ok());
        assert!(validate_temporal_expr("EXTRACT(YEAR FROM CURRENT_DATE()) - 5").is_ok());
        assert!(validate_temporal_expr("DATE_TRUNC(CURRENT_DATE(), MONTH)").is_ok());
        assert!(validate_temporal_expr("").is_err());
        assert!(validate_temporal_expr("5 - 1").is_err());
        assert!(validate_temporal_expr("CURRENT_DATE(); DROP TABLE outputs").is_err());
        assert!(validate_temporal_expr("DATE_SUB(CURRENT_DATE(), INTERVAL '1' YEAR)").is_err());
        assert!(validate_temporal_expr("CURRENT_DATE() OR 1").is_err());
        assert!(validate_temporal_expr("EXTRACT(YEAR FROM CURRENT_DATE()").is_err());
    }

    #[test]
    fn aggregates_get_aliases_and_validate_types() {
        let validated = validate(
            &joined(json!({
                "columns": [
                    "tahun.tahun",
                    {"aggregate": "COUNT", "column": "*"},
                    {"aggregate": "count", "column": "id", "alias": "total"}
                ],
                "group_by": ["tahun.tahun"]
            })),
            &catalog(),
        )
        .unwrap();
        let aliases: Vec<&str> = validated
            .select
            .iter()
            .filter_map(|s| match s {
                ResolvedSelect::Aggregate { alias, .. } => Some(alias.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(aliases, vec!["count_all", "total"]);

        let err = validate(
            &ir(json!({"table": "outputs", "columns": [{"aggregate": "SUM", "column": "judul"}]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidAggregate(_)));

        let err = validate(
            &ir(json!({"table": "outputs", "columns": [
                {"aggregate": "COUNT", "column": "id", "alias": "n"},
                {"aggregate": "MAX", "column": "id", "alias": "N"}
            ]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidAggregate(_)));

        let err = validate(
            &ir(json!({"table": "outputs", "columns": [
                {"aggregate": "COUNT", "column": "id", "alias": "total; DROP"}
            ]})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidAggregate(_)));
    }

    #[test]
    fn having_and_order_by_resolve_aliases() {
        let validated = validate(
            &joined(json!({
                "columns": ["author.nama", {"aggregate": "COUNT", "column": "id", "alias": "total"}],
                "group_by": ["author.nama"],
                "having": [{"column": "total", "operator": ">", "value": 3}],
                "order_by": {"column": "TOTAL", "direction": "DESC"}
            })),
            &catalog(),
        )
        .unwrap();
        assert!(matches!(&validated.having[0].target, HavingTarget::Aggregate(e) if e.function == AggregateFn::Count));
        assert_eq!(validated.order_by[0].key, OrderKey::Alias("total".into()));
    }

    #[test]
    fn having_accepts_inline_aggregate_call() {
        let validated = validate(
            &joined(json!({
                "columns": ["author.nama"],
                "group_by": ["author.nama"],
                "having": [{"column": "COUNT(outputs.id)", "operator": ">=", "value": 2}]
            })),
            &catalog(),
        )
        .unwrap();
        assert!(matches!(&validated.having[0].target, HavingTarget::Aggregate(_)));
    }

    #[test]
    fn having_on_plain_ungrouped_column_is_rejected() {
        let err = validate(
            &joined(json!({
                "columns": ["author.nama"],
                "group_by": ["author.nama"],
                "having": [{"column": "tahun.tahun", "operator": ">", "value": 2020}]
            })),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidAggregate(_)));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = validate(
            &ir(json!({"table": "outputs", "columns": ["judul"], "limit": 0})),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::InvalidLimit(0)));
    }

    #[test]
    fn star_selects_resolve_scope() {
        let validated =
            validate(&joined(json!({"columns": ["*", "author.*"]})), &catalog()).unwrap();
        assert_eq!(validated.select[0], ResolvedSelect::AllColumns { scope: 0 });
        assert_eq!(validated.select[1], ResolvedSelect::AllColumns { scope: 1 });
    }
}
