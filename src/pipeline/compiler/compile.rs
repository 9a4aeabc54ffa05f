//! Deterministic IR → SQL compilation.
//!
//! Aliases: `t1` for the primary table, `t2, t3, …` for joins in join-list
//! order. Every column reference in every clause is alias-qualified.

use super::dialect::escape_like;
use super::{CompiledQuery, QueryTarget, SqlGenerationError, TableAlias};
use crate::config::Dialect;
use crate::pipeline::ir::{
    AggregateArg, AggregateExpr, ColumnRef, HavingTarget, OrderKey, ResolvedFilter,
    ResolvedSelect, TypedValue, ValidatedIr,
};
use crate::pipeline::ir::Operator;
use crate::warehouse::ColumnKind;

struct Renderer<'a> {
    ir: &'a ValidatedIr,
    target: &'a QueryTarget,
}

impl Renderer<'_> {
    fn dialect(&self) -> Dialect {
        self.target.dialect
    }

    fn alias(scope: usize) -> String {
        format!("t{}", scope + 1)
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!(
            "{}.{}",
            Self::alias(column.scope),
            self.dialect().quote_identifier(&column.column)
        )
    }

    fn aggregate(&self, expr: &AggregateExpr) -> String {
        let arg = match &expr.arg {
            AggregateArg::Star => "*".to_string(),
            AggregateArg::Column(column) => self.column(column),
        };
        let distinct = if expr.distinct { "DISTINCT " } else { "" };
        format!("{}({distinct}{arg})", expr.function.as_sql())
    }

    fn table(&self, scope: usize) -> String {
        format!(
            "{} AS {}",
            self.dialect()
                .qualified_table(&self.target.namespace, &self.ir.tables[scope]),
            Self::alias(scope)
        )
    }

    fn value(&self, value: &TypedValue) -> String {
        let dialect = self.dialect();
        match value {
            TypedValue::Number(n) => n.clone(),
            TypedValue::Bool(true) => "TRUE".to_string(),
            TypedValue::Bool(false) => "FALSE".to_string(),
            TypedValue::Text(s) => dialect.string_literal(s),
            TypedValue::Date(d) => dialect.date(*d),
            TypedValue::DateTime(dt) => dialect.datetime(*dt),
            TypedValue::Timestamp(dt) => dialect.timestamp(*dt),
            TypedValue::Expr(expr) => expr.clone(),
            TypedValue::List(items) => format!(
                "({})",
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Case-insensitive partial match on both operands.
    fn partial_match(&self, lhs: &str, text: &str, negate: bool) -> String {
        let needle = text.trim().trim_matches('%');
        let pattern = self
            .dialect()
            .string_literal(&format!("%{}%", escape_like(needle)));
        let not = if negate { "NOT " } else { "" };
        format!("LOWER({lhs}) {not}LIKE LOWER({pattern})")
    }

    fn filter(&self, filter: &ResolvedFilter) -> String {
        let lhs = self.column(&filter.target);
        let text_column = filter.target.kind == ColumnKind::Text;
        match (&filter.value, filter.operator) {
            (TypedValue::Text(s), op) if text_column || op.is_pattern() => match op {
                Operator::NotEq => self.partial_match(&lhs, s, true),
                Operator::Eq | Operator::ILike | Operator::Like => {
                    self.partial_match(&lhs, s, false)
                }
                other => format!("{lhs} {} {}", other.as_sql(), self.dialect().string_literal(s)),
            },
            (TypedValue::List(items), Operator::In)
                if text_column && items.iter().all(|i| matches!(i, TypedValue::Text(_))) =>
            {
                let alternatives: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        TypedValue::Text(s) => Some(self.partial_match(&lhs, s, false)),
                        _ => None,
                    })
                    .collect();
                format!("({})", alternatives.join(" OR "))
            }
            (value, op) => format!("{lhs} {} {}", op.as_sql(), self.value(value)),
        }
    }

    fn where_clause(&self) -> Option<String> {
        let filters = &self.ir.filters;
        let first = filters.first()?;
        let mut expr = self.filter(first);
        let rest = &filters[1..];
        let mixed = rest.iter().any(|f| f.connective != rest[0].connective);
        if mixed {
            for filter in rest {
                expr = format!(
                    "({expr} {} {})",
                    filter.connective.as_sql(),
                    self.filter(filter)
                );
            }
        } else if let Some(next) = rest.first() {
            let parts: Vec<String> = filters.iter().map(|f| self.filter(f)).collect();
            expr = parts.join(&format!(" {} ", next.connective.as_sql()));
        }
        Some(expr)
    }
}

/// Compile a validated IR into one statement for `target`. Pure: the same
/// input always yields the same text.
pub fn compile(
    ir: &ValidatedIr,
    target: &QueryTarget,
) -> Result<CompiledQuery, SqlGenerationError> {
    let r = Renderer { ir, target };
    let dialect = target.dialect;
    let grouping = !ir.group_by.is_empty()
        || ir
            .select
            .iter()
            .any(|s| matches!(s, ResolvedSelect::Aggregate { .. }));

    let mut select: Vec<String> = Vec::with_capacity(ir.select.len());
    let mut output_names: Vec<String> = ir
        .select
        .iter()
        .filter_map(|s| match s {
            ResolvedSelect::Aggregate { alias, .. } => Some(alias.to_ascii_lowercase()),
            _ => None,
        })
        .collect();
    for item in &ir.select {
        match item {
            ResolvedSelect::AllColumns { scope } => {
                if grouping {
                    tracing::warn!(table = %ir.tables[*scope], "Dropping * from grouped SELECT");
                    continue;
                }
                select.push(format!("{}.*", Renderer::alias(*scope)));
            }
            ResolvedSelect::Column(column) => {
                if grouping && !ir.group_by.contains(column) {
                    tracing::warn!(
                        column = %column.column,
                        table = %ir.tables[column.scope],
                        "Dropping non-grouped column from SELECT"
                    );
                    continue;
                }
                let name = column.column.to_ascii_lowercase();
                if output_names.contains(&name) {
                    let renamed = format!("{}_{}", ir.tables[column.scope], column.column);
                    select.push(format!(
                        "{} AS {}",
                        r.column(column),
                        dialect.quote_identifier(&renamed)
                    ));
                    output_names.push(renamed.to_ascii_lowercase());
                } else {
                    select.push(r.column(column));
                    output_names.push(name);
                }
            }
            ResolvedSelect::Aggregate { expr, alias } => {
                select.push(format!(
                    "{} AS {}",
                    r.aggregate(expr),
                    dialect.quote_identifier(alias)
                ));
            }
        }
    }
    if select.is_empty() {
        return Err(if ir.select.is_empty() {
            SqlGenerationError::NoSelectClause
        } else {
            SqlGenerationError::GroupByUnsatisfiable
        });
    }

    let mut lines = vec![format!("SELECT {}", select.join(", ")), format!("FROM {}", r.table(0))];

    for (i, join) in ir.joins.iter().enumerate() {
        let conditions: Vec<String> = join
            .conditions
            .iter()
            .map(|(left, right)| format!("{} = {}", r.column(left), r.column(right)))
            .collect();
        lines.push(format!(
            "{} {} ON {}",
            join.kind.as_sql(),
            r.table(i + 1),
            conditions.join(" AND ")
        ));
    }

    if let Some(predicate) = r.where_clause() {
        lines.push(format!("WHERE {predicate}"));
    }

    if !ir.group_by.is_empty() {
        let columns: Vec<String> = ir.group_by.iter().map(|c| r.column(c)).collect();
        lines.push(format!("GROUP BY {}", columns.join(", ")));
    }

    if !ir.having.is_empty() {
        let conditions: Vec<String> = ir
            .having
            .iter()
            .map(|h| {
                let lhs = match &h.target {
                    HavingTarget::Aggregate(expr) => r.aggregate(expr),
                    HavingTarget::Column(column) => r.column(column),
                };
                format!("{lhs} {} {}", h.operator.as_sql(), r.value(&h.value))
            })
            .collect();
        lines.push(format!("HAVING {}", conditions.join(" AND ")));
    }

    let order: Vec<String> = ir
        .order_by
        .iter()
        .filter_map(|o| {
            let key = match &o.key {
                OrderKey::Alias(alias) => dialect.quote_identifier(alias),
                OrderKey::Aggregate(expr) => r.aggregate(expr),
                OrderKey::Column(column) => {
                    if grouping && !ir.group_by.contains(column) {
                        tracing::warn!(
                            column = %column.column,
                            "Dropping non-grouped ORDER BY key"
                        );
                        return None;
                    }
                    r.column(column)
                }
            };
            Some(format!("{key} {}", o.direction.as_sql()))
        })
        .collect();
    if !order.is_empty() {
        lines.push(format!("ORDER BY {}", order.join(", ")));
    }

    if let Some(limit) = ir.limit {
        lines.push(format!("LIMIT {limit}"));
    }

    let aliases = ir
        .tables
        .iter()
        .enumerate()
        .map(|(i, table)| TableAlias {
            table: table.clone(),
            alias: Renderer::alias(i),
        })
        .collect();

    Ok(CompiledQuery {
        text: lines.join("\n"),
        aliases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ir::{validate, QueryIr};
    use crate::warehouse::{Catalog, DatasetRef, TableSchema};
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
                    ("id_kategori", "INT64"),
                    ("tanggal_terbit", "DATE"),
                    ("url_pdf", "STRING"),
                ],
            ),
            TableSchema::new("author", &[("id", "INT64"), ("nama", "STRING")]),
            TableSchema::new("tahun", &[("id", "INT64"), ("tahun", "INT64")]),
            TableSchema::new("kategori", &[("id", "INT64"), ("nama", "STRING")]),
        ])
    }

    fn target() -> QueryTarget {
        QueryTarget::new(DatasetRef::new("p", "d"), Dialect::BigQuery)
    }

    fn compile_json(value: serde_json::Value) -> Result<CompiledQuery, SqlGenerationError> {
        let ir: QueryIr = serde_json::from_value(value).unwrap();
        let validated = validate(&ir, &catalog()).unwrap();
        compile(&validated, &target())
    }

    #[test]
    fn aliases_follow_join_order() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul", "kategori.nama", "author.nama", "tahun.tahun"],
            "joins": [
                {"table": "kategori", "on": "outputs.id_kategori = kategori.id"},
                {"table": "author", "on": "outputs.id_author = author.id"},
                {"table": "tahun", "on": "tahun.id = outputs.id_tahun"}
            ]
        }))
        .unwrap();

        assert_eq!(compiled.alias_of("outputs"), Some("t1"));
        assert_eq!(compiled.alias_of("kategori"), Some("t2"));
        assert_eq!(compiled.alias_of("author"), Some("t3"));
        assert_eq!(compiled.alias_of("tahun"), Some("t4"));
        assert_eq!(
            compiled.text,
            "SELECT t1.`judul`, t2.`nama`, t3.`nama` AS `author_nama`, t4.`tahun`\n\
             FROM `p.d.outputs` AS t1\n\
             INNER JOIN `p.d.kategori` AS t2 ON t1.`id_kategori` = t2.`id`\n\
             INNER JOIN `p.d.author` AS t3 ON t1.`id_author` = t3.`id`\n\
             INNER JOIN `p.d.tahun` AS t4 ON t4.`id` = t1.`id_tahun`"
        );
    }

    #[test]
    fn bare_column_is_qualified_with_primary_alias() {
        let compiled =
            compile_json(json!({"table": "outputs", "columns": ["judul", "url_pdf"]})).unwrap();
        assert_eq!(compiled.text, "SELECT t1.`judul`, t1.`url_pdf`\nFROM `p.d.outputs` AS t1");
    }

    #[test]
    fn text_filters_use_case_insensitive_partial_match() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul"],
            "joins": [{"table": "author", "on": "outputs.id_author = author.id"}],
            "filters": [
                {"column": "author.nama", "operator": "ILIKE", "value": "%Budi%"},
                {"column": "judul", "operator": "=", "value": "50% o'clock"},
                {"column": "judul", "operator": "!=", "value": "draft"}
            ]
        }))
        .unwrap();
        assert!(compiled.text.contains(
            "WHERE LOWER(t2.`nama`) LIKE LOWER('%Budi%') AND LOWER(t1.`judul`) LIKE LOWER('%50\\\\% o\\'clock%') AND LOWER(t1.`judul`) NOT LIKE LOWER('%draft%')"
        ));
    }

    #[test]
    fn numeric_and_date_values_are_never_quoted() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul"],
            "joins": [{"table": "tahun", "on": "outputs.id_tahun = tahun.id"}],
            "filters": [
                {"column": "tahun.tahun", "operator": ">=", "value": 2020},
                {"column": "tanggal_terbit", "operator": "<", "value": "2024-01-01"},
                {"column": "tahun.tahun", "operator": "IN", "value": [2022, 2023]}
            ]
        }))
        .unwrap();
        assert!(compiled.text.contains(
            "WHERE t2.`tahun` >= 2020 AND t1.`tanggal_terbit` < DATE(2024, 1, 1) AND t2.`tahun` IN (2022, 2023)"
        ));
    }

    #[test]
    fn text_in_list_becomes_or_of_partial_matches() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul"],
            "joins": [{"table": "author", "on": "outputs.id_author = author.id"}],
            "filters": [{"column": "author.nama", "operator": "IN", "value": ["budi", "sari"]}]
        }))
        .unwrap();
        assert!(compiled.text.contains(
            "WHERE (LOWER(t2.`nama`) LIKE LOWER('%budi%') OR LOWER(t2.`nama`) LIKE LOWER('%sari%'))"
        ));
    }

    #[test]
    fn mixed_connectives_are_parenthesized_left_to_right() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul"],
            "filters": [
                {"column": "id", "operator": ">", "value": 1},
                {"column": "id", "operator": "<", "value": 10, "connective": "AND"},
                {"column": "id", "operator": "=", "value": 99, "connective": "OR"}
            ]
        }))
        .unwrap();
        assert!(compiled
            .text
            .contains("WHERE ((t1.`id` > 1 AND t1.`id` < 10) OR t1.`id` = 99)"));
    }

    #[test]
    fn non_grouped_columns_are_dropped() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul", "tahun.tahun", {"aggregate": "COUNT", "column": "id", "alias": "jumlah"}],
            "joins": [{"table": "tahun", "on": "outputs.id_tahun = tahun.id"}],
            "group_by": ["tahun.tahun"],
            "order_by": [{"column": "judul"}, {"column": "jumlah", "direction": "DESC"}]
        }))
        .unwrap();
        assert_eq!(
            compiled.text,
            "SELECT t2.`tahun`, COUNT(t1.`id`) AS `jumlah`\n\
             FROM `p.d.outputs` AS t1\n\
             INNER JOIN `p.d.tahun` AS t2 ON t1.`id_tahun` = t2.`id`\n\
             GROUP BY t2.`tahun`\n\
             ORDER BY `jumlah` DESC"
        );
    }

    #[test]
    fn having_alias_expands_to_aggregate() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["author.nama", {"aggregate": "COUNT", "column": "id", "alias": "total"}],
            "joins": [{"table": "author", "on": "outputs.id_author = author.id"}],
            "group_by": ["author.nama"],
            "having": [{"column": "total", "operator": ">", "value": 3}],
            "order_by": {"column": "total", "direction": "DESC"},
            "limit": 5
        }))
        .unwrap();
        assert!(compiled
            .text
            .contains("HAVING COUNT(t1.`id`) > 3\nORDER BY `total` DESC\nLIMIT 5"));
    }

    #[test]
    fn empty_select_is_a_generation_error() {
        let err = compile_json(json!({"table": "outputs"})).unwrap_err();
        assert_eq!(err, SqlGenerationError::NoSelectClause);
    }

    #[test]
    fn fully_dropped_select_is_unsatisfiable() {
        let err = compile_json(json!({
            "table": "outputs",
            "columns": ["judul"],
            "group_by": ["id"]
        }))
        .unwrap_err();
        assert_eq!(err, SqlGenerationError::GroupByUnsatisfiable);
    }

    #[test]
    fn compilation_is_deterministic() {
        let ir: QueryIr = serde_json::from_value(json!({
            "table": "outputs",
            "columns": ["judul", {"aggregate": "COUNT", "column": "*"}],
            "joins": [{"table": "author", "on": "outputs.id_author = author.id", "kind": "LEFT"}],
            "filters": [{"column": "author.nama", "operator": "ILIKE", "value": "budi"}],
            "group_by": ["judul"],
            "order_by": {"column": "judul"},
            "limit": 3
        }))
        .unwrap();
        let validated = validate(&ir, &catalog()).unwrap();
        let first = compile(&validated, &target()).unwrap();
        let second = compile(&validated, &target()).unwrap();
        assert_eq!(first, second);
        assert!(first.text.contains("LEFT JOIN `p.d.author` AS t2"));
        assert!(first.text.contains("COUNT(*) AS `count_all`"));
    }

    #[test]
    fn postgres_dialect_quotes_with_double_quotes() {
        let ir: QueryIr = serde_json::from_value(json!({
            "table": "outputs",
            "columns": ["judul"],
            "filters": [
                {"column": "judul", "operator": "ILIKE", "value": "o'brien"},
                {"column": "tanggal_terbit", "operator": ">=", "value": "2023-06-01"}
            ]
        }))
        .unwrap();
        let validated = validate(&ir, &catalog()).unwrap();
        let compiled = compile(
            &validated,
            &QueryTarget::new(DatasetRef::new("p", "publikasi"), Dialect::Postgres),
        )
        .unwrap();
        assert_eq!(
            compiled.text,
            "SELECT t1.\"judul\"\n\
             FROM \"publikasi\".\"outputs\" AS t1\n\
             WHERE LOWER(t1.\"judul\") LIKE LOWER('%o''brien%') AND t1.\"tanggal_terbit\" >= make_date(2023, 6, 1)"
        );
    }

    #[test]
    fn every_column_reference_carries_an_alias() {
        let compiled = compile_json(json!({
            "table": "outputs",
            "columns": ["judul", "author.nama"],
            "joins": [{"table": "author", "on": "outputs.id_author = author.id"}],
            "filters": [{"column": "author.nama", "operator": "ILIKE", "value": "x"}],
            "order_by": {"column": "judul"}
        }))
        .unwrap();
        let re = regex::Regex::new(r"(\S*)`(judul|nama|id_author|id)`").unwrap();
        for caps in re.captures_iter(&compiled.text) {
            let prefix = &caps[1];
            assert!(
                prefix.ends_with("t1.") || prefix.ends_with("t2."),
                "unqualified reference in {}",
                compiled.text
            );
        }
    }
}
