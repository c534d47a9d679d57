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

//! Statement execution for MySQL virtual files.

use std::sync::Arc;

use super::{exec, query_rows, MySqlFactory, DIALECT};
use crate::{
    config::DataConfig,
    error::{Error, Result},
    format::{self, CsvOptions, JsonOptions, RowData},
    path::FileFormat,
    pool::Pool,
    vfile::ContentSource,
};

pub struct MySqlSource {
    pool: Arc<Pool<MySqlFactory>>,
    data: DataConfig,
}

impl MySqlSource {
    pub fn new(pool: Arc<Pool<MySqlFactory>>, data: DataConfig) -> MySqlSource {
        MySqlSource { pool, data }
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions { include_header: self.data.include_csv_header, ..CsvOptions::default() }
    }

    fn json_options(&self) -> JsonOptions {
        JsonOptions { pretty: self.data.pretty_json, ..JsonOptions::default() }
    }
}

impl ContentSource for MySqlSource {
    fn fetch_object(&self, database: &str, object: &str, format: FileFormat) -> Result<String> {
        let mut conn = self.pool.acquire()?;
        let mut sql = format!("SELECT * FROM {}", DIALECT.qualified(Some(database), object));
        if self.data.max_rows_per_file > 0 {
            sql.push_str(&format!(" LIMIT {}", self.data.max_rows_per_file));
        }
        let (columns, hints, rows) = query_rows(&mut conn, &sql)?;
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
        let mut conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {} LIMIT 1",
            DIALECT.qualified(Some(database), table),
            DIALECT.quote_identifier(pk_column),
            DIALECT.quote_literal(row_id)
        );
        let (columns, hints, rows) = query_rows(&mut conn, &sql)?;
        match format {
            FileFormat::Json => match rows.first() {
                Some(row) => Ok(format!(
                    "{}\n",
                    format::row_to_json(&columns, &hints, row, &self.json_options())
                )),
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
        let mut conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = {} LIMIT 1",
            DIALECT.qualified(Some(database), table),
            DIALECT.quote_identifier(pk_column),
            DIALECT.quote_literal(row_id)
        );
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        Ok(!rows.is_empty())
    }

    fn database_info(&self, database: &str) -> Result<String> {
        let mut conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT SCHEMA_NAME, DEFAULT_CHARACTER_SET_NAME, DEFAULT_COLLATION_NAME \
             FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = {}",
            DIALECT.quote_literal(database)
        );
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Ok("Database not found\n".to_string()),
        };
        let cell = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();

        let count = |conn: &mut super::MySqlSession, sql: String| -> Result<u64> {
            let (_, _, rows) = query_rows(conn, &sql)?;
            Ok(rows
                .into_iter()
                .next()
                .and_then(|r| r.into_iter().next().flatten())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0))
        };
        let db = DIALECT.quote_literal(database);
        let tables = count(
            &mut conn,
            format!(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE'",
                db
            ),
        )?;
        let views = count(
            &mut conn,
            format!("SELECT COUNT(*) FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_SCHEMA = {}", db),
        )?;
        let procedures = count(
            &mut conn,
            format!(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.ROUTINES \
                 WHERE ROUTINE_SCHEMA = {} AND ROUTINE_TYPE = 'PROCEDURE'",
                db
            ),
        )?;
        let functions = count(
            &mut conn,
            format!(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.ROUTINES \
                 WHERE ROUTINE_SCHEMA = {} AND ROUTINE_TYPE = 'FUNCTION'",
                db
            ),
        )?;
        let triggers = count(
            &mut conn,
            format!(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TRIGGERS WHERE TRIGGER_SCHEMA = {}",
                db
            ),
        )?;

        let mut out = String::new();
        out.push_str(&format!("Database: {}\n", cell(0)));
        out.push_str(&format!("Character Set: {}\n", cell(1)));
        out.push_str(&format!("Collation: {}\n", cell(2)));
        out.push_str("\nObjects:\n");
        out.push_str(&format!("  Tables: {}\n", tables));
        out.push_str(&format!("  Views: {}\n", views));
        out.push_str(&format!("  Procedures: {}\n", procedures));
        out.push_str(&format!("  Functions: {}\n", functions));
        out.push_str(&format!("  Triggers: {}\n", triggers));
        Ok(out)
    }

    fn user_info(&self, name: &str) -> Result<String> {
        let (user, host) = name
            .split_once('@')
            .ok_or_else(|| Error::invalid(format!("invalid user file name: {}", name)))?;

        let mut conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT User, Host, account_locked, password_expired, max_connections, \
             max_user_connections FROM mysql.user WHERE User = {} AND Host = {}",
            DIALECT.quote_literal(user),
            DIALECT.quote_literal(host)
        );
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Err(Error::not_found(format!("user {} not found", name))),
        };
        let cell = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();

        let mut out = String::new();
        out.push_str(&format!("User: {}@{}\n", cell(0), cell(1)));
        out.push_str(&format!(
            "Account Locked: {}\n",
            if cell(2) == "Y" { "Yes" } else { "No" }
        ));
        out.push_str(&format!("Password Expired: {}\n", cell(3)));
        out.push_str(&format!("Max Connections: {}\n", cell(4)));
        out.push_str(&format!("Max User Connections: {}\n", cell(5)));
        Ok(out)
    }

    fn insert_rows(&self, database: &str, table: &str, rows: &[RowData]) -> Result<u64> {
        let mut conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        let mut affected = 0u64;
        for row in rows {
            affected += exec(&mut conn, &format::build_insert(&DIALECT, &qualified, row))?;
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
        let mut conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        exec(&mut conn, &format::build_update(&DIALECT, &qualified, row, pk_column, row_id))
    }

    fn delete_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        exec(&mut conn, &format::build_delete(&DIALECT, &qualified, pk_column, row_id))
    }
}
