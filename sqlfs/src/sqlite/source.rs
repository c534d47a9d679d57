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

//! Statement execution for SQLite virtual files.

use std::sync::Arc;

use super::{collect_rows, map_err, SqliteFactory, DIALECT};
use crate::{
    config::DataConfig,
    error::{Error, Result},
    format::{self, CsvOptions, JsonOptions, RowData},
    path::FileFormat,
    pool::Pool,
    vfile::ContentSource,
};

pub struct SqliteSource {
    pool: Arc<Pool<SqliteFactory>>,
    data: DataConfig,
}

impl SqliteSource {
    pub fn new(pool: Arc<Pool<SqliteFactory>>, data: DataConfig) -> SqliteSource {
        SqliteSource { pool, data }
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions { include_header: self.data.include_csv_header, ..CsvOptions::default() }
    }

    fn json_options(&self) -> JsonOptions {
        JsonOptions { pretty: self.data.pretty_json, ..JsonOptions::default() }
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        let conn = self.pool.acquire()?;
        conn.execute(sql, []).map(|n| n as u64).map_err(map_err)
    }
}

impl ContentSource for SqliteSource {
    fn fetch_object(&self, database: &str, object: &str, format: FileFormat) -> Result<String> {
        let conn = self.pool.acquire()?;
        let mut sql = format!("SELECT * FROM {}", DIALECT.qualified(Some(database), object));
        if self.data.max_rows_per_file > 0 {
            sql.push_str(&format!(" LIMIT {}", self.data.max_rows_per_file));
        }
        let (columns, hints, rows) = collect_rows(&conn, &sql)?;
        match format {
            FileFormat::Csv => Ok(format::to_csv(&columns, &rows, &self.csv_options())),
            FileFormat::Json => Ok(format::to_json(&columns, &hints, &rows, &self.json_options())),
            _ => Err(Error::invalid("unsupported table serialization format")),
        }
    }

    fn fetch_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
        format: FileFormat,
    ) -> Result<String> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {} LIMIT 1",
            DIALECT.qualified(Some(database), table),
            DIALECT.quote_identifier(pk_column),
            DIALECT.quote_literal(row_id)
        );
        let (columns, hints, rows) = collect_rows(&conn, &sql)?;
        match format {
            FileFormat::Json => match rows.first() {
                Some(row) => {
                    Ok(format!("{}\n", format::row_to_json(&columns, &hints, row, &self.json_options())))
                }
                None => Ok("{}\n".to_string()),
            },
            FileFormat::Csv => Ok(format::to_csv(&columns, &rows, &self.csv_options())),
            _ => Err(Error::invalid("unsupported row serialization format")),
        }
    }

    fn row_exists(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
    ) -> Result<bool> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = {} LIMIT 1",
            DIALECT.qualified(Some(database), table),
            DIALECT.quote_identifier(pk_column),
            DIALECT.quote_literal(row_id)
        );
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let mut rows = stmt.query([]).map_err(map_err)?;
        Ok(rows.next().map_err(map_err)?.is_some())
    }

    fn database_info(&self, database: &str) -> Result<String> {
        let conn = self.pool.acquire()?;
        let file: String = conn
            .query_row(
                "SELECT file FROM pragma_database_list WHERE name = ?1",
                [database],
                |row| row.get(0),
            )
            .map_err(map_err)?;

        let count = |object_type: &str| -> Result<u64> {
            let sql = format!(
                "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = {} \
                 AND name NOT LIKE 'sqlite_%'",
                DIALECT.quote_identifier(database),
                DIALECT.quote_literal(object_type)
            );
            conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(map_err)
        };

        let mut out = String::new();
        out.push_str(&format!("Database: {}\n", database));
        out.push_str(&format!("File: {}\n", file));
        out.push_str("\nObjects:\n");
        out.push_str(&format!("  Tables: {}\n", count("table")?));
        out.push_str(&format!("  Views: {}\n", count("view")?));
        out.push_str(&format!("  Triggers: {}\n", count("trigger")?));
        Ok(out)
    }

    fn user_info(&self, _name: &str) -> Result<String> {
        Err(Error::not_found("SQLite has no user accounts"))
    }

    fn insert_rows(&self, database: &str, table: &str, rows: &[RowData]) -> Result<u64> {
        let conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        let mut affected = 0u64;
        for row in rows {
            let sql = format::build_insert(&DIALECT, &qualified, row);
            affected += conn.execute(&sql, []).map_err(map_err)? as u64;
        }
        Ok(affected)
    }

    fn update_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
        row: &RowData,
    ) -> Result<u64> {
        let qualified = DIALECT.qualified(Some(database), table);
        self.execute(&format::build_update(&DIALECT, &qualified, row, pk_column, row_id))
    }

    fn delete_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
    ) -> Result<u64> {
        let qualified = DIALECT.qualified(Some(database), table);
        self.execute(&format::build_delete(&DIALECT, &qualified, pk_column, row_id))
    }
}
