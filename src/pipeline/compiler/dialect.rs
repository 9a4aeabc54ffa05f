//! Per-dialect lexical rules: identifier quoting, string literals, date
//! constructors, table qualification.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::config::Dialect;
use crate::warehouse::DatasetRef;

impl Dialect {
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::BigQuery => format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`")),
            Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    pub fn string_literal(&self, value: &str) -> String {
        match self {
            Dialect::BigQuery => {
                let mut escaped = String::with_capacity(value.len() + 2);
                escaped.push('\'');
                for c in value.chars() {
                    match c {
                        '\\' => escaped.push_str("\\\\"),
                        '\'' => escaped.push_str("\\'"),
                        '\n' => escaped.push_str("\\n"),
                        '\r' => escaped.push_str("\\r"),
                        '\t' => escaped.push_str("\\t"),
                        c if c.is_control() => {}
                        c => escaped.push(c),
                    }
                }
                escaped.push('\'');
                escaped
            }
            Dialect::Postgres => {
                let cleaned: String = value
                    .chars()
                    .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
                    .collect();
                format!("'{}'", cleaned.replace('\'', "''"))
            }
        }
    }

    /// Fully qualified, quoted table name.
    pub fn qualified_table(&self, namespace: &DatasetRef, table: &str) -> String {
        match self {
            Dialect::BigQuery => self.quote_identifier(&format!(
                "{}.{}.{}",
                namespace.project, namespace.dataset, table
            )),
            Dialect::Postgres => format!(
                "{}.{}",
                self.quote_identifier(&namespace.dataset),
                self.quote_identifier(table)
            ),
        }
    }

    pub fn date(&self, date: NaiveDate) -> String {
        let (y, m, d) = (date.year(), date.month(), date.day());
        match self {
            Dialect::BigQuery => format!("DATE({y}, {m}, {d})"),
            Dialect::Postgres => format!("make_date({y}, {m}, {d})"),
        }
    }

    pub fn datetime(&self, dt: NaiveDateTime) -> String {
        let (y, mo, d) = (dt.year(), dt.month(), dt.day());
        let (h, mi, s) = (dt.hour(), dt.minute(), dt.second());
        match self {
            Dialect::BigQuery => format!("DATETIME({y}, {mo}, {d}, {h}, {mi}, {s})"),
            Dialect::Postgres => format!("make_timestamp({y}, {mo}, {d}, {h}, {mi}, {s})"),
        }
    }

    /// UTC instant, as epoch seconds.
    pub fn timestamp(&self, dt: NaiveDateTime) -> String {
        let seconds = dt.and_utc().timestamp();
        match self {
            Dialect::BigQuery => format!("TIMESTAMP_SECONDS({seconds})"),
            Dialect::Postgres => format!("to_timestamp({seconds})"),
        }
    }
}

/// Escape LIKE metacharacters so user text matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
