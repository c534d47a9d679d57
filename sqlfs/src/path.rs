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

//! Path router: classifies filesystem paths into database objects.
//!
//! `parse` is a pure function; unrecognized paths yield
//! `ParsedPath::NotFound` rather than an error.

use std::fmt;

/// Serialization format selected by a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    None,
    Csv,
    Json,
    Sql,
}

impl FileFormat {
    /// Extension without the leading dot, empty for `None`.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
            FileFormat::Sql => "sql",
            FileFormat::None => "",
        }
    }

    /// Case-sensitive match of an extension (without dot).
    pub fn from_extension(ext: &str) -> FileFormat {
        match ext {
            "csv" => FileFormat::Csv,
            "json" => FileFormat::Json,
            "sql" => FileFormat::Sql,
            _ => FileFormat::None,
        }
    }
}

/// Scope of a server variable file under `.variables/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Global,
    Session,
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VariableScope::Global => write!(f, "global"),
            VariableScope::Session => write!(f, "session"),
        }
    }
}

/// The router's classification of a path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    Root,
    Database { database: String },
    DatabaseInfo { database: String },
    TablesDir { database: String },
    ViewsDir { database: String },
    ProceduresDir { database: String },
    FunctionsDir { database: String },
    TriggersDir { database: String },
    TableFile { database: String, table: String, format: FileFormat },
    TableDir { database: String, table: String },
    TableSchema { database: String, table: String },
    TableIndexes { database: String, table: String },
    TableStats { database: String, table: String },
    TableRowsDir { database: String, table: String },
    TableRowFile { database: String, table: String, row_id: String, format: FileFormat },
    ViewFile { database: String, view: String, format: FileFormat },
    ViewDir { database: String, view: String },
    ProcedureFile { database: String, name: String },
    FunctionFile { database: String, name: String },
    TriggerFile { database: String, name: String },
    ServerInfo,
    UsersDir,
    UserFile { name: String },
    VariablesDir,
    GlobalVariablesDir,
    SessionVariablesDir,
    VariableFile { scope: VariableScope, name: String },
    NotFound,
}

impl ParsedPath {
    /// Whether the node is listed as a directory. Depends only on the
    /// variant tag.
    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            ParsedPath::Root
                | ParsedPath::Database { .. }
                | ParsedPath::TablesDir { .. }
                | ParsedPath::ViewsDir { .. }
                | ParsedPath::ProceduresDir { .. }
                | ParsedPath::FunctionsDir { .. }
                | ParsedPath::TriggersDir { .. }
                | ParsedPath::TableDir { .. }
                | ParsedPath::TableRowsDir { .. }
                | ParsedPath::ViewDir { .. }
                | ParsedPath::UsersDir
                | ParsedPath::VariablesDir
                | ParsedPath::GlobalVariablesDir
                | ParsedPath::SessionVariablesDir
        )
    }

    /// Whether writes to the node are rejected outright. Table files, view
    /// files and row files accept writes; everything else is read-only.
    pub fn is_read_only(&self) -> bool {
        !matches!(
            self,
            ParsedPath::TableFile { .. }
                | ParsedPath::ViewFile { .. }
                | ParsedPath::TableRowFile { .. }
        )
    }

    /// Database the node belongs to, if any.
    pub fn database(&self) -> Option<&str> {
        match self {
            ParsedPath::Database { database }
            | ParsedPath::DatabaseInfo { database }
            | ParsedPath::TablesDir { database }
            | ParsedPath::ViewsDir { database }
            | ParsedPath::ProceduresDir { database }
            | ParsedPath::FunctionsDir { database }
            | ParsedPath::TriggersDir { database }
            | ParsedPath::TableFile { database, .. }
            | ParsedPath::TableDir { database, .. }
            | ParsedPath::TableSchema { database, .. }
            | ParsedPath::TableIndexes { database, .. }
            | ParsedPath::TableStats { database, .. }
            | ParsedPath::TableRowsDir { database, .. }
            | ParsedPath::TableRowFile { database, .. }
            | ParsedPath::ViewFile { database, .. }
            | ParsedPath::ViewDir { database, .. }
            | ParsedPath::ProcedureFile { database, .. }
            | ParsedPath::FunctionFile { database, .. }
            | ParsedPath::TriggerFile { database, .. } => Some(database),
            _ => None,
        }
    }

    /// Deterministic cache key for this node's content.
    ///
    /// Keys are slash-separated so `invalidate_table`'s `"{db}/{t}/*"`
    /// pattern covers every blob derived from a table:
    /// `db/t/csv`, `db/t/json/rows/1`, `db/t/schema` and so on.
    pub fn cache_key(&self) -> String {
        match self {
            ParsedPath::TableFile { database, table, format } => {
                format!("{}/{}/{}", database, table, format.extension())
            }
            ParsedPath::TableRowFile { database, table, row_id, format } => {
                format!("{}/{}/{}/rows/{}", database, table, format.extension(), row_id)
            }
            ParsedPath::TableSchema { database, table } => {
                format!("{}/{}/schema", database, table)
            }
            ParsedPath::TableIndexes { database, table } => {
                format!("{}/{}/indexes", database, table)
            }
            ParsedPath::TableStats { database, table } => {
                format!("{}/{}/stats", database, table)
            }
            ParsedPath::ViewFile { database, view, format } => {
                format!("{}/{}/{}", database, view, format.extension())
            }
            ParsedPath::ProcedureFile { database, name }
            | ParsedPath::FunctionFile { database, name }
            | ParsedPath::TriggerFile { database, name } => {
                format!("{}/{}/sql", database, name)
            }
            ParsedPath::DatabaseInfo { database } => format!("{}/.info", database),
            ParsedPath::ServerInfo => ".server_info".to_string(),
            ParsedPath::UserFile { name } => format!(".users/{}", name),
            ParsedPath::VariableFile { scope, name } => {
                format!(".variables/{}/{}", scope, name)
            }
            ParsedPath::Database { database } => database.clone(),
            _ => String::new(),
        }
    }
}

/// Split a file segment into stem and recognized format. The final `.` in
/// the segment decides; unknown extensions and empty stems are not files.
fn split_format(segment: &str) -> Option<(&str, FileFormat)> {
    let dot = segment.rfind('.')?;
    if dot == 0 {
        return None;
    }
    let format = FileFormat::from_extension(&segment[dot + 1..]);
    if format == FileFormat::None {
        return None;
    }
    Some((&segment[..dot], format))
}

/// Classify a path string. Splits on `/` discarding empty segments and
/// dispatches on the first segment.
pub fn parse(path: &str) -> ParsedPath {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if parts.is_empty() {
        return ParsedPath::Root;
    }

    match parts[0] {
        ".server_info" => {
            return if parts.len() == 1 { ParsedPath::ServerInfo } else { ParsedPath::NotFound };
        }
        ".users" => return parse_users(&parts),
        ".variables" => return parse_variables(&parts),
        _ => {}
    }

    let database = parts[0].to_string();

    if parts.len() == 1 {
        return ParsedPath::Database { database };
    }

    if parts[1] == ".info" {
        return if parts.len() == 2 {
            ParsedPath::DatabaseInfo { database }
        } else {
            ParsedPath::NotFound
        };
    }

    match parts[1] {
        "tables" => parse_tables(database, &parts),
        "views" => parse_views(database, &parts),
        "procedures" => parse_sql_leaf(database, &parts, SqlLeaf::Procedure),
        "functions" => parse_sql_leaf(database, &parts, SqlLeaf::Function),
        "triggers" => parse_sql_leaf(database, &parts, SqlLeaf::Trigger),
        _ => ParsedPath::NotFound,
    }
}

fn parse_users(parts: &[&str]) -> ParsedPath {
    match parts.len() {
        1 => ParsedPath::UsersDir,
        2 => {
            let name = parts[1].strip_suffix(".info").unwrap_or(parts[1]);
            ParsedPath::UserFile { name: name.to_string() }
        }
        _ => ParsedPath::NotFound,
    }
}

fn parse_variables(parts: &[&str]) -> ParsedPath {
    if parts.len() == 1 {
        return ParsedPath::VariablesDir;
    }
    let scope = match parts[1] {
        "global" => VariableScope::Global,
        "session" => VariableScope::Session,
        _ => return ParsedPath::NotFound,
    };
    match parts.len() {
        2 => match scope {
            VariableScope::Global => ParsedPath::GlobalVariablesDir,
            VariableScope::Session => ParsedPath::SessionVariablesDir,
        },
        3 => ParsedPath::VariableFile { scope, name: parts[2].to_string() },
        _ => ParsedPath::NotFound,
    }
}

fn parse_tables(database: String, parts: &[&str]) -> ParsedPath {
    if parts.len() == 2 {
        return ParsedPath::TablesDir { database };
    }

    if let Some((stem, format)) = split_format(parts[2]) {
        return if parts.len() == 3 {
            ParsedPath::TableFile { database, table: stem.to_string(), format }
        } else {
            ParsedPath::NotFound
        };
    }

    let table = parts[2].to_string();

    if parts.len() == 3 {
        return ParsedPath::TableDir { database, table };
    }

    match parts[3] {
        ".schema" if parts.len() == 4 => ParsedPath::TableSchema { database, table },
        ".indexes" if parts.len() == 4 => ParsedPath::TableIndexes { database, table },
        ".stats" if parts.len() == 4 => ParsedPath::TableStats { database, table },
        "rows" => match parts.len() {
            4 => ParsedPath::TableRowsDir { database, table },
            5 => match split_format(parts[4]) {
                Some((row_id, format))
                    if format == FileFormat::Csv || format == FileFormat::Json =>
                {
                    ParsedPath::TableRowFile {
                        database,
                        table,
                        row_id: row_id.to_string(),
                        format,
                    }
                }
                _ => ParsedPath::NotFound,
            },
            _ => ParsedPath::NotFound,
        },
        _ => ParsedPath::NotFound,
    }
}

fn parse_views(database: String, parts: &[&str]) -> ParsedPath {
    match parts.len() {
        2 => ParsedPath::ViewsDir { database },
        3 => match split_format(parts[2]) {
            Some((stem, format)) => {
                ParsedPath::ViewFile { database, view: stem.to_string(), format }
            }
            None => ParsedPath::ViewDir { database, view: parts[2].to_string() },
        },
        _ => ParsedPath::NotFound,
    }
}

enum SqlLeaf {
    Procedure,
    Function,
    Trigger,
}

fn parse_sql_leaf(database: String, parts: &[&str], leaf: SqlLeaf) -> ParsedPath {
    if parts.len() == 2 {
        return match leaf {
            SqlLeaf::Procedure => ParsedPath::ProceduresDir { database },
            SqlLeaf::Function => ParsedPath::FunctionsDir { database },
            SqlLeaf::Trigger => ParsedPath::TriggersDir { database },
        };
    }
    if parts.len() != 3 {
        return ParsedPath::NotFound;
    }
    match split_format(parts[2]) {
        Some((stem, FileFormat::Sql)) => {
            let name = stem.to_string();
            match leaf {
                SqlLeaf::Procedure => ParsedPath::ProcedureFile { database, name },
                SqlLeaf::Function => ParsedPath::FunctionFile { database, name },
                SqlLeaf::Trigger => ParsedPath::TriggerFile { database, name },
            }
        }
        _ => ParsedPath::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_specials() {
        assert_eq!(parse("/"), ParsedPath::Root);
        assert_eq!(parse(""), ParsedPath::Root);
        assert_eq!(parse("//"), ParsedPath::Root);
        assert_eq!(parse("/.server_info"), ParsedPath::ServerInfo);
        assert_eq!(parse("/.users"), ParsedPath::UsersDir);
        assert_eq!(
            parse("/.users/root@localhost.info"),
            ParsedPath::UserFile { name: "root@localhost".into() }
        );
        assert_eq!(parse("/.variables"), ParsedPath::VariablesDir);
        assert_eq!(parse("/.variables/global"), ParsedPath::GlobalVariablesDir);
        assert_eq!(parse("/.variables/session"), ParsedPath::SessionVariablesDir);
        assert_eq!(
            parse("/.variables/global/max_connections"),
            ParsedPath::VariableFile { scope: VariableScope::Global, name: "max_connections".into() }
        );
        assert_eq!(parse("/.variables/other"), ParsedPath::NotFound);
        assert_eq!(parse("/.server_info/x"), ParsedPath::NotFound);
    }

    #[test]
    fn database_level() {
        assert_eq!(parse("/shop"), ParsedPath::Database { database: "shop".into() });
        assert_eq!(parse("/shop/.info"), ParsedPath::DatabaseInfo { database: "shop".into() });
        assert_eq!(parse("/shop/tables"), ParsedPath::TablesDir { database: "shop".into() });
        assert_eq!(parse("/shop/views"), ParsedPath::ViewsDir { database: "shop".into() });
        assert_eq!(parse("/shop/procedures"), ParsedPath::ProceduresDir { database: "shop".into() });
        assert_eq!(parse("/shop/functions"), ParsedPath::FunctionsDir { database: "shop".into() });
        assert_eq!(parse("/shop/triggers"), ParsedPath::TriggersDir { database: "shop".into() });
        assert_eq!(parse("/shop/bogus"), ParsedPath::NotFound);
    }

    #[test]
    fn table_level() {
        assert_eq!(
            parse("/shop/tables/users.csv"),
            ParsedPath::TableFile {
                database: "shop".into(),
                table: "users".into(),
                format: FileFormat::Csv
            }
        );
        assert_eq!(
            parse("/shop/tables/users.json"),
            ParsedPath::TableFile {
                database: "shop".into(),
                table: "users".into(),
                format: FileFormat::Json
            }
        );
        assert_eq!(
            parse("/shop/tables/users.sql"),
            ParsedPath::TableFile {
                database: "shop".into(),
                table: "users".into(),
                format: FileFormat::Sql
            }
        );
        assert_eq!(
            parse("/shop/tables/users"),
            ParsedPath::TableDir { database: "shop".into(), table: "users".into() }
        );
        assert_eq!(
            parse("/shop/tables/users/.schema"),
            ParsedPath::TableSchema { database: "shop".into(), table: "users".into() }
        );
        assert_eq!(
            parse("/shop/tables/users/.indexes"),
            ParsedPath::TableIndexes { database: "shop".into(), table: "users".into() }
        );
        assert_eq!(
            parse("/shop/tables/users/.stats"),
            ParsedPath::TableStats { database: "shop".into(), table: "users".into() }
        );
        assert_eq!(
            parse("/shop/tables/users/rows"),
            ParsedPath::TableRowsDir { database: "shop".into(), table: "users".into() }
        );
        assert_eq!(
            parse("/shop/tables/users/rows/42.json"),
            ParsedPath::TableRowFile {
                database: "shop".into(),
                table: "users".into(),
                row_id: "42".into(),
                format: FileFormat::Json
            }
        );
        assert_eq!(parse("/shop/tables/users/rows/42"), ParsedPath::NotFound);
        assert_eq!(parse("/shop/tables/users/rows/42.sql"), ParsedPath::NotFound);
        assert_eq!(parse("/shop/tables/users/other"), ParsedPath::NotFound);
        assert_eq!(parse("/shop/tables/users.csv/deeper"), ParsedPath::NotFound);
        // Unknown extensions make table directories, not files.
        assert_eq!(
            parse("/shop/tables/archive.2024"),
            ParsedPath::TableDir { database: "shop".into(), table: "archive.2024".into() }
        );
        // Extension matching is case-sensitive.
        assert_eq!(
            parse("/shop/tables/users.CSV"),
            ParsedPath::TableDir { database: "shop".into(), table: "users.CSV".into() }
        );
    }

    #[test]
    fn views_and_routines() {
        assert_eq!(
            parse("/shop/views/top_sellers.json"),
            ParsedPath::ViewFile {
                database: "shop".into(),
                view: "top_sellers".into(),
                format: FileFormat::Json
            }
        );
        assert_eq!(
            parse("/shop/views/top_sellers"),
            ParsedPath::ViewDir { database: "shop".into(), view: "top_sellers".into() }
        );
        assert_eq!(
            parse("/shop/procedures/cleanup.sql"),
            ParsedPath::ProcedureFile { database: "shop".into(), name: "cleanup".into() }
        );
        assert_eq!(
            parse("/shop/functions/total.sql"),
            ParsedPath::FunctionFile { database: "shop".into(), name: "total".into() }
        );
        assert_eq!(
            parse("/shop/triggers/audit.sql"),
            ParsedPath::TriggerFile { database: "shop".into(), name: "audit".into() }
        );
        assert_eq!(parse("/shop/procedures/cleanup.json"), ParsedPath::NotFound);
        assert_eq!(parse("/shop/procedures/cleanup"), ParsedPath::NotFound);
    }

    #[test]
    fn parse_is_pure() {
        for path in ["/", "/db", "/db/tables/t.csv", "/db/tables/t/rows/1.json", "/x/y/z"] {
            assert_eq!(parse(path), parse(path));
        }
    }

    #[test]
    fn attribute_table() {
        let dirs = [
            parse("/"),
            parse("/db"),
            parse("/db/tables"),
            parse("/db/views"),
            parse("/db/tables/t"),
            parse("/db/tables/t/rows"),
            parse("/.users"),
            parse("/.variables"),
            parse("/.variables/global"),
        ];
        for p in &dirs {
            assert!(p.is_directory(), "{:?}", p);
            assert!(p.is_read_only(), "{:?}", p);
        }

        let writable = [
            parse("/db/tables/t.csv"),
            parse("/db/tables/t.json"),
            parse("/db/views/v.csv"),
            parse("/db/tables/t/rows/1.json"),
        ];
        for p in &writable {
            assert!(!p.is_directory(), "{:?}", p);
            assert!(!p.is_read_only(), "{:?}", p);
        }

        let read_only_files = [
            parse("/db/tables/t/.schema"),
            parse("/db/tables/t/.indexes"),
            parse("/db/tables/t/.stats"),
            parse("/db/procedures/p.sql"),
            parse("/db/functions/f.sql"),
            parse("/db/triggers/g.sql"),
            parse("/.server_info"),
            parse("/db/.info"),
            parse("/.users/u@h.info"),
            parse("/.variables/global/x"),
        ];
        for p in &read_only_files {
            assert!(!p.is_directory(), "{:?}", p);
            assert!(p.is_read_only(), "{:?}", p);
        }
    }

    #[test]
    fn cache_keys_fall_under_table_pattern() {
        assert_eq!(parse("/db/tables/t.csv").cache_key(), "db/t/csv");
        assert_eq!(parse("/db/tables/t/rows/7.json").cache_key(), "db/t/json/rows/7");
        assert_eq!(parse("/db/tables/t/.schema").cache_key(), "db/t/schema");
        assert_eq!(parse("/db/tables/t/.stats").cache_key(), "db/t/stats");
        assert_eq!(parse("/db/views/v.sql").cache_key(), "db/v/sql");
        assert_eq!(parse("/db/.info").cache_key(), "db/.info");
        assert_eq!(parse("/.variables/session/x").cache_key(), ".variables/session/x");
    }
}
