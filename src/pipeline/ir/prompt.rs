use crate::warehouse::Catalog;

pub const IR_SYSTEM_PROMPT: &str = r#"You translate a user's question about a research database into a JSON query description (IR). You never write SQL.

IR FORMAT:
{
  "table": "primary_table",
  "columns": ["column", "other_table.column", {"aggregate": "COUNT", "column": "id", "alias": "total"}],
  "joins": [{"table": "other_table", "on": "primary_table.id_other = other_table.id", "kind": "INNER"}],
  "filters": [{"column": "other_table.name", "operator": "ILIKE", "value": "text", "connective": "AND"}],
  "group_by": ["other_table.column"],
  "having": [{"column": "total", "operator": ">", "value": 10}],
  "order_by": [{"column": "total", "direction": "DESC"}],
  "limit": 10
}

RULES:
1. Output ONLY valid JSON. No comments, no SQL, no extra text.
2. "table" is the primary table. A column without a dot belongs to the primary table. Columns of joined tables MUST be written "table.column".
3. Foreign keys: a column named id_<x> or <x>_id points at table <x>. When the question mentions a name, title, label or year that lives in the referenced table, JOIN that table and filter/sort on the referenced table's column (e.g. "author.nama"), never on the raw identifier column.
4. Text filters use operator "ILIKE" with the plain search text as value (no % signs).
5. Numeric columns (INT64, NUMERIC, FLOAT64) take unquoted numbers: "value": 2022, never "value": "2022".
6. DATE/DATETIME/TIMESTAMP columns take ISO strings ("2023-01-01") or a temporal expression object {"expr": "DATE_SUB(CURRENT_DATE(), INTERVAL 5 YEAR)"} built only from CURRENT_DATE, CURRENT_TIMESTAMP, DATE_SUB, DATE_ADD, EXTRACT, DATE_TRUNC.
7. Operators: =, !=, <, <=, >, >=, ILIKE, LIKE, IN (IN takes an array).
8. Aggregates: COUNT, SUM, AVG, MIN, MAX. When you use "group_by", every non-aggregated column in "columns" must also be in "group_by".
9. "order_by" and "limit" express rankings ("top 5", "5 teratas", "terbaru", "most recent").
10. If the question needs the content of a document (summary, methodology, conclusion), include the column holding the document link (e.g. a url_pdf / PDF_* column).
11. If the question cannot be answered from these tables, output {"error": "<short reason>"}."#;

/// User turn for the IR builder: schema, inferred relations, question.
pub fn build_ir_prompt(question: &str, catalog: &Catalog) -> String {
    let mut prompt = String::new();
    prompt.push_str("TABLES AND COLUMNS:\n");
    prompt.push_str(
        &serde_json::to_string_pretty(&catalog.to_prompt_json()).unwrap_or_else(|_| "{}".into()),
    );
    prompt.push_str("\n\n");

    let relations = catalog.relation_lines();
    if !relations.is_empty() {
        prompt.push_str("RELATIONS (foreign key -> referenced table):\n");
        for line in relations {
            prompt.push_str(&format!("- {line}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User request: {}", question.trim()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::TableSchema;

    #[test]
    fn prompt_contains_schema_relations_and_question() {
        let catalog = Catalog::new(vec![
            TableSchema::new("outputs", &[("judul", "STRING"), ("id_author", "INT64")]),
            TableSchema::new("author", &[("id", "INT64"), ("nama", "STRING")]),
        ]);
        let prompt = build_ir_prompt("  karya Budi ", &catalog);
        assert!(prompt.contains("\"outputs\""));
        assert!(prompt.contains("\"nama\""));
        assert!(prompt.contains("- outputs.id_author -> author"));
        assert!(prompt.ends_with("User request: karya Budi"));
    }

    #[test]
    fn relation_section_omitted_without_links() {
        let catalog = Catalog::new(vec![TableSchema::new("tahun", &[("tahun", "INT64")])]);
        let prompt = build_ir_prompt("q", &catalog);
        assert!(!prompt.contains("RELATIONS"));
    }

    #[test]
    fn system_prompt_states_dereferencing_rule() {
        assert!(IR_SYSTEM_PROMPT.contains("never on the raw identifier column"));
    }
}
