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

//! Virtual files: content generated on demand, writes buffered per handle
//! and committed on flush.
//!
//! `DbVirtualFile` carries all backend-independent behaviour; the SQL that
//! actually runs against a database sits behind the `ContentSource` trait
//! each backend implements.

use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use crate::{
    cache::{CacheCategory, CacheManager},
    config::DataConfig,
    error::{Error, Result},
    format::{self, RowData},
    path::{FileFormat, ParsedPath},
    schema::{self, ObjectKind, SchemaManager},
};

/// Backend-specific statement execution: everything a virtual file or the
/// engine needs to run against a live connection.
pub trait ContentSource: Send + Sync {
    /// `SELECT * FROM` a table or view, serialized as CSV or JSON.
    fn fetch_object(&self, database: &str, object: &str, format: FileFormat) -> Result<String>;

    /// Fetch a single row by primary key, serialized per `format`.
    /// An absent row yields an empty JSON object / empty CSV body.
    fn fetch_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
        format: FileFormat,
    ) -> Result<String>;

    /// Probe whether a row with this primary-key value exists.
    fn row_exists(&self, database: &str, table: &str, pk_column: &str, row_id: &str)
        -> Result<bool>;

    /// Human-readable `.info` text for a database.
    fn database_info(&self, database: &str) -> Result<String>;

    /// Human-readable text for `.users/{user}@{host}.info`.
    fn user_info(&self, name: &str) -> Result<String>;

    /// Insert each row; returns the number of affected rows.
    fn insert_rows(&self, database: &str, table: &str, rows: &[RowData]) -> Result<u64>;

    /// Update the row with this primary-key value.
    fn update_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
        row: &RowData,
    ) -> Result<u64>;

    /// Delete the row with this primary-key value; returns affected rows.
    fn delete_row(&self, database: &str, table: &str, pk_column: &str, row_id: &str)
        -> Result<u64>;
}

struct FileState {
    content: Option<Arc<String>>,
    write_buffer: Vec<u8>,
    modified: bool,
    last_error: String,
}

/// A per-open-path object: lazy content on the read side, a private write
/// buffer on the write side. All state sits under one per-file lock, so
/// concurrent operations on the same handle are serialized in caller
/// order.
pub struct DbVirtualFile {
    path: ParsedPath,
    source: Arc<dyn ContentSource>,
    schema: Arc<dyn SchemaManager>,
    cache: Arc<CacheManager>,
    config: DataConfig,
    state: Mutex<FileState>,
}

impl DbVirtualFile {
    pub fn new(
        path: ParsedPath,
        source: Arc<dyn ContentSource>,
        schema: Arc<dyn SchemaManager>,
        cache: Arc<CacheManager>,
        config: DataConfig,
    ) -> DbVirtualFile {
        DbVirtualFile {
            path,
            source,
            schema,
            cache,
            config,
            state: Mutex::new(FileState {
                content: None,
                write_buffer: Vec::new(),
                modified: false,
                last_error: String::new(),
            }),
        }
    }

    pub fn path(&self) -> &ParsedPath {
        &self.path
    }

    pub fn is_modified(&self) -> bool {
        self.state.lock().modified
    }

    pub fn last_error(&self) -> String {
        self.state.lock().last_error.clone()
    }

    /// File content, generated on first call and cached both locally and
    /// in the shared cache.
    pub fn content(&self) -> Result<Arc<String>> {
        let mut state = self.state.lock();
        if let Some(content) = &state.content {
            return Ok(content.clone());
        }

        let key = self.path.cache_key();
        if let Some(blob) = self.cache.get(&key) {
            let content = Arc::new(blob);
            state.content = Some(content.clone());
            return Ok(content);
        }

        let generated = match self.generate() {
            Ok(generated) => generated,
            Err(e) => {
                state.last_error = e.to_string();
                return Err(e);
            }
        };
        if !generated.is_empty() {
            self.cache.put_category(&key, generated.clone(), CacheCategory::Data);
        }
        let content = Arc::new(generated);
        state.content = Some(content.clone());
        Ok(content)
    }

    /// Content size; triggers generation.
    pub fn size(&self) -> Result<usize> {
        Ok(self.content()?.len())
    }

    /// Copy into the write buffer at `offset`, growing it as needed.
    /// No database action happens until flush.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        if self.path.is_read_only() {
            return Err(Error::read_only());
        }
        let mut state = self.state.lock();
        let offset = offset as usize;
        let end = offset + data.len();
        if state.write_buffer.len() < end {
            state.write_buffer.resize(end, 0);
        }
        state.write_buffer[offset..end].copy_from_slice(data);
        state.modified = true;
        Ok(data.len())
    }

    /// Resize the write buffer.
    pub fn truncate(&self, size: u64) -> Result<()> {
        if self.path.is_read_only() {
            return Err(Error::read_only());
        }
        let mut state = self.state.lock();
        state.write_buffer.resize(size as usize, 0);
        state.modified = true;
        Ok(())
    }

    /// Commit buffered writes. On success the buffer is cleared and the
    /// table's cache entries are invalidated; on failure the buffer stays
    /// intact for a retry and `last_error` records the condition.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.modified {
            return Ok(());
        }

        let outcome = self.commit(&state.write_buffer);
        match outcome {
            Ok(affected) => {
                debug!("flushed {} rows to {:?}", affected, self.path.cache_key());
                state.write_buffer.clear();
                state.modified = false;
                state.content = None;
                state.last_error.clear();
                drop(state);
                if let (Some(db), Some(object)) = (self.path.database(), self.object_name()) {
                    self.cache.invalidate_table(db, object);
                }
                Ok(())
            }
            Err(e) => {
                state.last_error = e.to_string();
                Err(e)
            }
        }
    }

    fn object_name(&self) -> Option<&str> {
        match &self.path {
            ParsedPath::TableFile { table, .. }
            | ParsedPath::TableRowFile { table, .. } => Some(table),
            ParsedPath::ViewFile { view, .. } => Some(view),
            _ => None,
        }
    }

    fn commit(&self, buffer: &[u8]) -> Result<u64> {
        match &self.path {
            ParsedPath::TableFile { database, table, format } => match format {
                FileFormat::Csv | FileFormat::Json => {
                    self.commit_table(database, table, *format, buffer)
                }
                _ => Err(Error::read_only()),
            },
            ParsedPath::TableRowFile { database, table, row_id, .. } => {
                self.commit_row(database, table, row_id, buffer)
            }
            _ => Err(Error::read_only()),
        }
    }

    fn commit_table(
        &self,
        database: &str,
        table: &str,
        format: FileFormat,
        buffer: &[u8],
    ) -> Result<u64> {
        let text = buffer_text(buffer)?;
        let rows = match format {
            FileFormat::Csv => {
                // Written CSV always carries a header line; anything else
                // would silently rename columns.
                let options = format::CsvOptions { include_header: true, ..Default::default() };
                format::parse_csv(&text, &options)?
            }
            _ => format::parse_json(&text)?,
        };
        if rows.is_empty() {
            return Ok(0);
        }
        self.source.insert_rows(database, table, &rows)
    }

    fn commit_row(&self, database: &str, table: &str, row_id: &str, buffer: &[u8]) -> Result<u64> {
        let text = buffer_text(buffer)?;
        if text.trim().is_empty() {
            return Ok(0);
        }
        let mut row = format::parse_json_row(&text)?;

        let pk = self.primary_key(database, table)?;
        // The path's row id is authoritative when the body omits the key.
        row.entry(pk.clone()).or_insert_with(|| Some(row_id.to_string()));

        if self.source.row_exists(database, table, &pk, row_id)? {
            self.source.update_row(database, table, &pk, row_id, &row)
        } else {
            self.source.insert_rows(database, table, std::slice::from_ref(&row))
        }
    }

    fn primary_key(&self, database: &str, table: &str) -> Result<String> {
        let info = self
            .schema
            .describe_table(database, table)?
            .ok_or_else(|| Error::not_found(format!("table {}.{} not found", database, table)))?;
        if info.primary_key.is_empty() {
            return Err(Error::invalid(format!(
                "table {}.{} has no primary key",
                database, table
            )));
        }
        Ok(info.primary_key)
    }

    fn generate(&self) -> Result<String> {
        match &self.path {
            ParsedPath::TableFile { database, table, format } => match format {
                FileFormat::Sql => {
                    let ddl = self.schema.create_statement(database, table, ObjectKind::Table)?;
                    Ok(format!("{};\n", ddl))
                }
                _ => self.source.fetch_object(database, table, *format),
            },
            ParsedPath::ViewFile { database, view, format } => match format {
                FileFormat::Sql => {
                    let ddl = self.schema.create_statement(database, view, ObjectKind::View)?;
                    Ok(format!("{};\n", ddl))
                }
                _ => self.source.fetch_object(database, view, *format),
            },
            ParsedPath::TableRowFile { database, table, row_id, format } => {
                let pk = self.primary_key(database, table)?;
                self.source.fetch_row(database, table, &pk, row_id, *format)
            }
            ParsedPath::TableSchema { database, table } => {
                Ok(render_table_schema(&self.schema.list_columns(database, table)?))
            }
            ParsedPath::TableIndexes { database, table } => {
                Ok(render_table_indexes(&self.schema.list_indexes(database, table)?))
            }
            ParsedPath::TableStats { database, table } => {
                match self.schema.describe_table(database, table)? {
                    Some(info) => Ok(render_table_stats(&info)),
                    None => Ok("Table not found\n".to_string()),
                }
            }
            ParsedPath::ProcedureFile { database, name } => {
                let ddl = self.schema.create_statement(database, name, ObjectKind::Procedure)?;
                Ok(format!("{};\n", ddl))
            }
            ParsedPath::FunctionFile { database, name } => {
                let ddl = self.schema.create_statement(database, name, ObjectKind::Function)?;
                Ok(format!("{};\n", ddl))
            }
            ParsedPath::TriggerFile { database, name } => {
                let ddl = self.schema.create_statement(database, name, ObjectKind::Trigger)?;
                Ok(format!("{};\n", ddl))
            }
            ParsedPath::ServerInfo => Ok(render_server_info(&self.schema.server_info()?)),
            ParsedPath::DatabaseInfo { database } => self.source.database_info(database),
            ParsedPath::UserFile { name } => self.source.user_info(name),
            ParsedPath::VariableFile { scope, name } => {
                let variables = match scope {
                    crate::path::VariableScope::Global => self.schema.global_variables()?,
                    crate::path::VariableScope::Session => self.schema.session_variables()?,
                };
                match variables.get(name) {
                    Some(value) => Ok(format!("{}\n", value)),
                    None => Err(Error::not_found(format!("variable {} not found", name))),
                }
            }
            _ => Ok(String::new()),
        }
    }
}

impl Drop for DbVirtualFile {
    fn drop(&mut self) {
        let state = self.state.lock();
        if state.modified {
            error!(
                "virtual file {:?} dropped with unflushed writes ({} bytes)",
                self.path.cache_key(),
                state.write_buffer.len()
            );
        }
    }
}

fn buffer_text(buffer: &[u8]) -> Result<String> {
    String::from_utf8(buffer.to_vec())
        .map_err(|_| Error::invalid("write buffer is not valid UTF-8"))
}

/// Tabular column listing for `.schema` files.
pub fn render_table_schema(columns: &[schema::ColumnInfo]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<30}{:<30}{:<8}{:<8}{:<20}{}\n",
        "Column", "Type", "Null", "Key", "Default", "Extra"
    ));
    out.push_str(&"-".repeat(100));
    out.push('\n');
    for column in columns {
        let default = match &column.default_value {
            Some(value) if !value.is_empty() => value.clone(),
            _ => "NULL".to_string(),
        };
        out.push_str(&format!(
            "{:<30}{:<30}{:<8}{:<8}{:<20}{}\n",
            column.name,
            column.full_type,
            if column.nullable { "YES" } else { "NO" },
            column.key,
            default,
            column.extra
        ));
    }
    out
}

/// Tabular index listing for `.indexes` files.
pub fn render_table_indexes(indexes: &[schema::IndexInfo]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<30}{:<10}{:<15}{}\n", "Index", "Unique", "Type", "Columns"));
    out.push_str(&"-".repeat(80));
    out.push('\n');
    for index in indexes {
        out.push_str(&format!(
            "{:<30}{:<10}{:<15}{}\n",
            index.name,
            if index.unique { "YES" } else { "NO" },
            index.index_type,
            index.columns.join(", ")
        ));
    }
    out
}

/// Key-value table description for `.stats` files.
pub fn render_table_stats(info: &schema::TableInfo) -> String {
    let mut out = String::new();
    out.push_str(&format!("Table: {}\n", info.name));
    out.push_str(&format!("Database: {}\n", info.database));
    out.push_str(&format!("Engine: {}\n", info.engine));
    out.push_str(&format!("Collation: {}\n", info.collation));
    out.push_str(&format!("Rows (estimate): {}\n", info.rows_estimate));
    out.push_str(&format!("Data length: {} bytes\n", info.data_length));
    out.push_str(&format!("Index length: {} bytes\n", info.index_length));
    out.push_str(&format!("Auto increment: {}\n", info.auto_increment));
    out.push_str(&format!("Created: {}\n", info.create_time));
    out.push_str(&format!("Updated: {}\n", info.update_time));
    if !info.comment.is_empty() {
        out.push_str(&format!("Comment: {}\n", info.comment));
    }
    out
}

/// Instance-level summary for `.server_info`.
pub fn render_server_info(info: &schema::ServerInfo) -> String {
    let mut out = String::new();
    out.push_str("Server Information\n");
    out.push_str(&"=".repeat(40));
    out.push_str("\n\n");
    out.push_str(&format!("Version: {}\n", info.version));
    out.push_str(&format!("Version Comment: {}\n", info.version_comment));
    out.push_str(&format!("Hostname: {}\n", info.hostname));
    out.push_str(&format!("Port: {}\n", info.port));
    out.push_str(&format!("Uptime: {} seconds\n", info.uptime));
    out.push_str(&format!("Threads Connected: {}\n", info.threads_connected));
    out.push_str(&format!("Threads Running: {}\n", info.threads_running));
    out.push_str(&format!("Questions: {}\n", info.questions));
    out.push_str(&format!("Slow Queries: {}\n", info.slow_queries));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnInfo, IndexInfo, TableInfo};

    #[test]
    fn schema_rendering_lines_up() {
        let columns = vec![
            ColumnInfo {
                name: "id".to_string(),
                full_type: "INTEGER".to_string(),
                nullable: false,
                key: "PRI".to_string(),
                ..ColumnInfo::default()
            },
            ColumnInfo {
                name: "name".to_string(),
                full_type: "TEXT".to_string(),
                nullable: true,
                default_value: Some("anon".to_string()),
                ..ColumnInfo::default()
            },
        ];
        let out = render_table_schema(&columns);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Column"));
        assert!(lines[2].starts_with("id"));
        assert!(lines[2].contains("PRI"));
        assert!(lines[2].contains("NULL"));
        assert!(lines[3].contains("anon"));
    }

    #[test]
    fn index_rendering_joins_columns() {
        let indexes = vec![IndexInfo {
            name: "idx_name_city".to_string(),
            unique: true,
            columns: vec!["name".to_string(), "city".to_string()],
            index_type: "BTREE".to_string(),
            ..IndexInfo::default()
        }];
        let out = render_table_indexes(&indexes);
        assert!(out.contains("idx_name_city"));
        assert!(out.contains("YES"));
        assert!(out.contains("name, city"));
    }

    #[test]
    fn stats_rendering_skips_empty_comment() {
        let info = TableInfo {
            name: "users".to_string(),
            database: "shop".to_string(),
            rows_estimate: 42,
            ..TableInfo::default()
        };
        let out = render_table_stats(&info);
        assert!(out.contains("Table: users\n"));
        assert!(out.contains("Rows (estimate): 42\n"));
        assert!(!out.contains("Comment:"));
    }
}
