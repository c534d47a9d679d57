// Copyright 2024-2026 The SQLFuse Developers.
// This file is part of SQLFuse.

// SQLFuse is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// SQLFuse is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with SQLFuse.  If not, see <http://www.gnu.org/licenses/>.

//! Row-set serialization (CSV, JSON), write-buffer parsing, and
//! dialect-quoted SQL statement builders. Stateless throughout.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A single nullable field value, carried as text the way the wire
/// protocols deliver it.
pub type SqlValue = Option<String>;

/// A row as an ordered column-name → value mapping.
pub type RowData = BTreeMap<String, SqlValue>;

/// CSV serialization options.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: char,
    pub quote: char,
    pub line_ending: &'static str,
    pub include_header: bool,
    pub quote_all: bool,
}

impl Default for CsvOptions {
    fn default() -> CsvOptions {
        CsvOptions {
            delimiter: ',',
            quote: '"',
            line_ending: "\n",
            include_header: true,
            quote_all: false,
        }
    }
}

/// JSON serialization options. Pretty output indents with two spaces.
#[derive(Debug, Clone, Copy)]
pub struct JsonOptions {
    pub pretty: bool,
    pub include_null: bool,
    /// Emit `{"rows": [...]}` instead of a bare array.
    pub wrapped: bool,
}

impl Default for JsonOptions {
    fn default() -> JsonOptions {
        JsonOptions { pretty: true, include_null: true, wrapped: false }
    }
}

/// Per-column typing hint derived from the backend's native type codes.
/// Numeric values are emitted as JSON numbers, boolean values as JSON
/// booleans; everything else stays a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnHint {
    pub numeric: bool,
    pub boolean: bool,
}

/// Quote a single CSV field. A field is quoted iff it contains the
/// delimiter, the quote character, CR or LF, or `quote_all` is set.
/// Quote characters are doubled inside quotes.
pub fn escape_csv_field(field: &str, options: &CsvOptions) -> String {
    let needs_quoting = options.quote_all
        || field
            .chars()
            .any(|c| c == options.delimiter || c == options.quote || c == '\n' || c == '\r');

    if !needs_quoting {
        return field.to_string();
    }

    let mut out = String::with_capacity(field.len() + 2);
    out.push(options.quote);
    for c in field.chars() {
        if c == options.quote {
            out.push(options.quote);
        }
        out.push(c);
    }
    out.push(options.quote);
    out
}

/// Serialize a row set as CSV. Null fields are emitted empty.
pub fn to_csv(columns: &[String], rows: &[Vec<SqlValue>], options: &CsvOptions) -> String {
    let mut out = String::new();

    if options.include_header {
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                out.push(options.delimiter);
            }
            out.push_str(&escape_csv_field(column, options));
        }
        out.push_str(options.line_ending);
    }

    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push(options.delimiter);
            }
            if let Some(value) = value {
                out.push_str(&escape_csv_field(value, options));
            }
        }
        out.push_str(options.line_ending);
    }

    out
}

fn typed_value(hint: ColumnHint, value: &str) -> Value {
    if hint.boolean {
        match value {
            "1" | "t" | "true" | "TRUE" | "True" => return Value::Bool(true),
            "0" | "f" | "false" | "FALSE" | "False" => return Value::Bool(false),
            _ => {}
        }
    }
    if hint.numeric {
        if let Ok(n) = value.parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Ok(f) = value.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(value.to_string())
}

fn object_from(
    columns: &[String],
    hints: &[ColumnHint],
    values: &[SqlValue],
    options: &JsonOptions,
) -> Map<String, Value> {
    let mut object = Map::new();
    for (i, column) in columns.iter().enumerate().take(values.len()) {
        let hint = hints.get(i).copied().unwrap_or_default();
        match &values[i] {
            Some(value) => {
                object.insert(column.clone(), typed_value(hint, value));
            }
            None if options.include_null => {
                object.insert(column.clone(), Value::Null);
            }
            None => {}
        }
    }
    object
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    // Serialization of Value cannot fail.
    rendered.unwrap_or_default()
}

/// Serialize a row set as a JSON array of objects, or a wrapped
/// `{"rows": [...]}` object.
pub fn to_json(
    columns: &[String],
    hints: &[ColumnHint],
    rows: &[Vec<SqlValue>],
    options: &JsonOptions,
) -> String {
    let array: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(object_from(columns, hints, row, options)))
        .collect();

    let root = if options.wrapped {
        let mut wrapper = Map::new();
        wrapper.insert("rows".to_string(), Value::Array(array));
        Value::Object(wrapper)
    } else {
        Value::Array(array)
    };

    render(&root, options.pretty)
}

/// Serialize a single row as a JSON object.
pub fn row_to_json(
    columns: &[String],
    hints: &[ColumnHint],
    values: &[SqlValue],
    options: &JsonOptions,
) -> String {
    render(&Value::Object(object_from(columns, hints, values, options)), options.pretty)
}

/// Parse CSV text into rows. When `include_header` is set, the first
/// logical line supplies column names; otherwise columns are named
/// `col0, col1, …`. Empty fields become nulls. Quoted fields may contain
/// the delimiter and embedded line breaks.
pub fn parse_csv(data: &str, options: &CsvOptions) -> Result<Vec<RowData>> {
    let records = split_csv(data, options)?;
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = records.into_iter();
    let headers: Vec<String> = if options.include_header {
        match records.next() {
            Some(first) => first,
            None => return Ok(Vec::new()),
        }
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for fields in records {
        let mut row = RowData::new();
        for (i, field) in fields.into_iter().enumerate() {
            let name = headers
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("col{}", i));
            row.insert(name, if field.is_empty() { None } else { Some(field) });
        }
        rows.push(row);
    }
    Ok(rows)
}

fn split_csv(data: &str, options: &CsvOptions) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = data.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == options.quote {
                if chars.peek() == Some(&options.quote) {
                    chars.next();
                    field.push(options.quote);
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == options.quote && field.is_empty() {
            in_quotes = true;
        } else if c == options.delimiter {
            record.push(std::mem::take(&mut field));
        } else if c == '\n' {
            if field.ends_with('\r') {
                field.pop();
            }
            record.push(std::mem::take(&mut field));
            if record.len() > 1 || !record[0].is_empty() {
                records.push(std::mem::take(&mut record));
            } else {
                record.clear();
            }
        } else {
            field.push(c);
        }
    }

    if in_quotes {
        return Err(Error::invalid("malformed CSV: unterminated quoted field"));
    }
    if !field.is_empty() || !record.is_empty() {
        if field.ends_with('\r') {
            field.pop();
        }
        record.push(field);
        if record.len() > 1 || !record[0].is_empty() {
            records.push(record);
        }
    }
    Ok(records)
}

fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse JSON text into rows. Accepts a bare array of objects, a
/// `{"rows": [...]}` wrapper, or a single object treated as one row.
pub fn parse_json(data: &str) -> Result<Vec<RowData>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Value = serde_json::from_str(data)
        .map_err(|e| Error::invalid(format!("malformed JSON: {}", e)))?;

    let items: Vec<Value> = match parsed {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("rows") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::invalid(format!(
                    "malformed JSON: \"rows\" is {}, expected an array",
                    json_type_name(&other)
                )))
            }
            None => vec![Value::Object(object)],
        },
        _ => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for item in items {
        if let Value::Object(object) = item {
            let mut row = RowData::new();
            for (key, value) in object {
                row.insert(key, value_to_sql(&value));
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Parse JSON text as a single row object.
pub fn parse_json_row(data: &str) -> Result<RowData> {
    let parsed: Value = serde_json::from_str(data)
        .map_err(|e| Error::invalid(format!("malformed JSON: {}", e)))?;

    match parsed {
        Value::Object(object) => {
            let mut row = RowData::new();
            for (key, value) in object {
                row.insert(key, value_to_sql(&value));
            }
            Ok(row)
        }
        other => Err(Error::invalid(format!(
            "malformed JSON: expected an object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// How a dialect escapes string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralStyle {
    /// Backslash escapes plus doubled single quotes (MySQL).
    Backslash,
    /// Doubled single quotes only (SQLite, PostgreSQL, Oracle).
    Doubled,
}

/// Identifier and literal quoting rules for one backend.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    pub identifier_quote: char,
    pub literal_style: LiteralStyle,
}

impl Dialect {
    pub const BACKTICK: Dialect =
        Dialect { identifier_quote: '`', literal_style: LiteralStyle::Backslash };
    pub const DOUBLE_QUOTE: Dialect =
        Dialect { identifier_quote: '"', literal_style: LiteralStyle::Doubled };

    /// Quote an identifier, doubling the quote character inside.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let q = self.identifier_quote;
        let mut out = String::with_capacity(identifier.len() + 2);
        out.push(q);
        for c in identifier.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// Quote a possibly database-qualified object name.
    pub fn qualified(&self, database: Option<&str>, object: &str) -> String {
        match database {
            Some(db) => format!("{}.{}", self.quote_identifier(db), self.quote_identifier(object)),
            None => self.quote_identifier(object),
        }
    }

    /// Escape the inside of a string literal; the caller adds the quotes.
    pub fn escape_literal(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            match (self.literal_style, c) {
                (_, '\'') => out.push_str("''"),
                (LiteralStyle::Backslash, '\\') => out.push_str("\\\\"),
                (LiteralStyle::Backslash, '\0') => out.push_str("\\0"),
                (LiteralStyle::Backslash, '\n') => out.push_str("\\n"),
                (LiteralStyle::Backslash, '\r') => out.push_str("\\r"),
                (_, c) => out.push(c),
            }
        }
        out
    }

    /// A complete quoted string literal.
    pub fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", self.escape_literal(value))
    }

    /// Render a nullable value as a SQL literal or `NULL`.
    pub fn sql_value(&self, value: &SqlValue) -> String {
        match value {
            Some(value) => self.quote_literal(value),
            None => "NULL".to_string(),
        }
    }
}

/// Build an `INSERT INTO … (…) VALUES (…)` statement. `table` is already
/// quoted/qualified by the caller's dialect.
pub fn build_insert(dialect: &Dialect, table: &str, row: &RowData) -> String {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (name, value) in row {
        columns.push(dialect.quote_identifier(name));
        values.push(dialect.sql_value(value));
    }
    format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), values.join(", "))
}

/// Build an `UPDATE … SET … WHERE pk = value` statement. The primary-key
/// column is excluded from the SET clause.
pub fn build_update(
    dialect: &Dialect,
    table: &str,
    row: &RowData,
    pk_column: &str,
    pk_value: &str,
) -> String {
    let mut assignments: Vec<String> = row
        .iter()
        .filter(|(name, _)| name.as_str() != pk_column)
        .map(|(name, value)| {
            format!("{} = {}", dialect.quote_identifier(name), dialect.sql_value(value))
        })
        .collect();
    if assignments.is_empty() {
        // Nothing but the key was written; keep the statement well-formed.
        assignments.push(format!(
            "{} = {}",
            dialect.quote_identifier(pk_column),
            dialect.quote_literal(pk_value)
        ));
    }
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        assignments.join(", "),
        dialect.quote_identifier(pk_column),
        dialect.quote_literal(pk_value)
    )
}

/// Build a `DELETE FROM … WHERE pk = value` statement.
pub fn build_delete(dialect: &Dialect, table: &str, pk_column: &str, pk_value: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        table,
        dialect.quote_identifier(pk_column),
        dialect.quote_literal(pk_value)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn csv_quoting_rule() {
        let opts = CsvOptions::default();
        assert_eq!(escape_csv_field("plain", &opts), "plain");
        assert_eq!(escape_csv_field("Bo,b", &opts), "\"Bo,b\"");
        assert_eq!(escape_csv_field("say \"hi\"", &opts), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv_field("line\nbreak", &opts), "\"line\nbreak\"");
        let all = CsvOptions { quote_all: true, ..CsvOptions::default() };
        assert_eq!(escape_csv_field("plain", &all), "\"plain\"");
    }

    #[test]
    fn csv_output_shape() {
        let columns = cols(&["id", "name"]);
        let rows = vec![
            vec![Some("1".to_string()), Some("Ann".to_string())],
            vec![Some("2".to_string()), Some("Bo,b".to_string())],
        ];
        let out = to_csv(&columns, &rows, &CsvOptions::default());
        assert_eq!(out, "id,name\n1,Ann\n2,\"Bo,b\"\n");
    }

    #[test]
    fn csv_round_trip() {
        let columns = cols(&["a", "b", "c"]);
        let rows = vec![
            vec![Some("x".to_string()), None, Some("with,comma".to_string())],
            vec![Some("\"quoted\"".to_string()), Some("line\nbreak".to_string()), None],
        ];
        let text = to_csv(&columns, &rows, &CsvOptions::default());
        let parsed = parse_csv(&text, &CsvOptions::default()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["a"], Some("x".to_string()));
        assert_eq!(parsed[0]["b"], None);
        assert_eq!(parsed[0]["c"], Some("with,comma".to_string()));
        assert_eq!(parsed[1]["a"], Some("\"quoted\"".to_string()));
        assert_eq!(parsed[1]["b"], Some("line\nbreak".to_string()));
    }

    #[test]
    fn csv_without_header_names_columns_by_index() {
        let opts = CsvOptions { include_header: false, ..CsvOptions::default() };
        let rows = parse_csv("1,Ann\n2,Bo\n", &opts).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["col0"], Some("1".to_string()));
        assert_eq!(rows[0]["col1"], Some("Ann".to_string()));
    }

    #[test]
    fn csv_unterminated_quote_is_rejected() {
        let err = parse_csv("a,b\n\"oops,1\n", &CsvOptions::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn json_typing_hints() {
        let columns = cols(&["id", "name", "active"]);
        let hints = vec![
            ColumnHint { numeric: true, boolean: false },
            ColumnHint::default(),
            ColumnHint { numeric: false, boolean: true },
        ];
        let rows = vec![vec![
            Some("7".to_string()),
            Some("Ann".to_string()),
            Some("1".to_string()),
        ]];
        let opts = JsonOptions { pretty: false, ..JsonOptions::default() };
        let out = to_json(&columns, &hints, &rows, &opts);
        assert_eq!(out, "[{\"active\":true,\"id\":7,\"name\":\"Ann\"}]");
    }

    #[test]
    fn json_null_handling() {
        let columns = cols(&["a", "b"]);
        let hints = vec![ColumnHint::default(); 2];
        let rows = vec![vec![None, Some("x".to_string())]];
        let with_null = to_json(
            &columns,
            &hints,
            &rows,
            &JsonOptions { pretty: false, ..JsonOptions::default() },
        );
        assert_eq!(with_null, "[{\"a\":null,\"b\":\"x\"}]");
        let without = to_json(
            &columns,
            &hints,
            &rows,
            &JsonOptions { pretty: false, include_null: false, wrapped: false },
        );
        assert_eq!(without, "[{\"b\":\"x\"}]");
    }

    #[test]
    fn json_round_trip() {
        let columns = cols(&["id", "name"]);
        let hints = vec![ColumnHint { numeric: true, boolean: false }, ColumnHint::default()];
        let rows = vec![
            vec![Some("1".to_string()), Some("Ann".to_string())],
            vec![Some("2".to_string()), None],
        ];
        let text = to_json(
            &columns,
            &hints,
            &rows,
            &JsonOptions { pretty: true, ..JsonOptions::default() },
        );
        let parsed = parse_json(&text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["id"], Some("1".to_string()));
        assert_eq!(parsed[0]["name"], Some("Ann".to_string()));
        assert_eq!(parsed[1]["name"], None);
    }

    #[test]
    fn json_accepts_wrapped_and_single_object() {
        let rows = parse_json("{\"rows\": [{\"a\": 1}, {\"a\": 2}]}").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], Some("2".to_string()));

        let rows = parse_json("{\"a\": \"x\"}").unwrap();
        assert_eq!(rows.len(), 1);

        assert!(parse_json("not json").is_err());
        assert!(parse_json_row("[1,2]").is_err());
    }

    #[test]
    fn dialect_quoting() {
        assert_eq!(Dialect::BACKTICK.quote_identifier("us`ers"), "`us``ers`");
        assert_eq!(Dialect::DOUBLE_QUOTE.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::BACKTICK.qualified(Some("shop"), "users"), "`shop`.`users`");
        assert_eq!(Dialect::BACKTICK.quote_literal("O'Brien\\x"), "'O''Brien\\\\x'");
        assert_eq!(Dialect::DOUBLE_QUOTE.quote_literal("O'Brien\\x"), "'O''Brien\\x'");
    }

    #[test]
    fn statement_builders() {
        let mut row = RowData::new();
        row.insert("id".to_string(), Some("3".to_string()));
        row.insert("name".to_string(), Some("Cy".to_string()));
        row.insert("note".to_string(), None);

        let d = Dialect::DOUBLE_QUOTE;
        let table = d.qualified(Some("shop"), "users");
        assert_eq!(
            build_insert(&d, &table, &row),
            "INSERT INTO \"shop\".\"users\" (\"id\", \"name\", \"note\") \
             VALUES ('3', 'Cy', NULL)"
        );
        assert_eq!(
            build_update(&d, &table, &row, "id", "3"),
            "UPDATE \"shop\".\"users\" SET \"name\" = 'Cy', \"note\" = NULL \
             WHERE \"id\" = '3'"
        );
        assert_eq!(
            build_delete(&d, &table, "id", "3"),
            "DELETE FROM \"shop\".\"users\" WHERE \"id\" = '3'"
        );
    }
}
