//! Deterministic facts over tabular context.
//!
//! When the synthesis context is a result set rather than prose, the model is
//! handed precomputed comparisons so it interprets numbers instead of
//! recomputing them.

use serde_json::Value;

use crate::warehouse::Row;

const YEAR_RANGE: std::ops::RangeInclusive<i64> = 1900..=2100;

/// Parse `context` as a JSON array of flat row objects.
pub fn parse_rows(context: &str) -> Option<Vec<Row>> {
    let value: Value = serde_json::from_str(context.trim()).ok()?;
    let Value::Array(items) = value else {
        return None;
    };
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(row) = item else {
            return None;
        };
        if row.values().any(|v| v.is_object() || v.is_array()) {
            return None;
        }
        rows.push(row);
    }
    (!rows.is_empty()).then_some(rows)
}

fn year_like(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_i64().is_some_and(|y| YEAR_RANGE.contains(&y)),
        Value::String(s) => s.trim().parse::<i64>().is_ok_and(|y| YEAR_RANGE.contains(&y)),
        _ => false,
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn year_named(column: &str) -> bool {
    let lower = column.to_lowercase();
    ["tahun", "year"].iter().any(|k| lower.contains(k))
}

/// Column naming each row: a year-named column with year values, then any
/// column with year values, then the first all-string column.
fn label_column(rows: &[Row]) -> Option<String> {
    let columns: Vec<&String> = rows[0].keys().collect();
    let in_every_row = |column: &str, test: fn(&Value) -> bool| {
        rows.iter().all(|r| r.get(column).is_some_and(test))
    };
    columns
        .iter()
        .find(|c| year_named(c.as_str()) && in_every_row(c.as_str(), year_like))
        .or_else(|| columns.iter().find(|c| in_every_row(c.as_str(), year_like)))
        .or_else(|| columns.iter().find(|c| in_every_row(c.as_str(), Value::is_string)))
        .map(|c| c.to_string())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_number(value))
    } else {
        format_number(value)
    }
}

/// Facts per numeric measure: first → last change (absolute and percent),
/// maximum and minimum. Every label mentioned comes from `rows`.
pub fn describe_rows(rows: &[Row]) -> Vec<String> {
    if rows.is_empty() {
        return vec![];
    }
    let Some(label) = label_column(rows) else {
        return vec![];
    };
    let labels: Vec<String> = rows.iter().map(|r| label_text(&r[&label])).collect();

    let mut facts = Vec::new();
    for measure in rows[0].keys().filter(|k| **k != label) {
        let values: Option<Vec<f64>> = rows
            .iter()
            .map(|r| r.get(measure).and_then(Value::as_f64))
            .collect();
        let Some(values) = values else {
            continue;
        };

        let last = values.len() - 1;
        if last > 0 {
            let diff = values[last] - values[0];
            let mut fact = format!(
                "{measure}: {} ({}) -> {} ({}), difference {} (absolute {})",
                format_number(values[0]),
                labels[0],
                format_number(values[last]),
                labels[last],
                signed(diff),
                format_number(diff.abs()),
            );
            if values[0] != 0.0 {
                fact.push_str(&format!(", {}%", signed(diff / values[0] * 100.0)));
            }
            facts.push(fact);
        }

        let (mut hi, mut lo) = (0, 0);
        for (i, v) in values.iter().enumerate() {
            if *v > values[hi] {
                hi = i;
            }
            if *v < values[lo] {
                lo = i;
            }
        }
        facts.push(format!(
            "{measure}: highest {} ({}), lowest {} ({})",
            format_number(values[hi]),
            labels[hi],
            format_number(values[lo]),
            labels[lo],
        ));
    }
    facts
}
