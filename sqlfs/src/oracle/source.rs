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

//! Statement execution for Oracle virtual files.

use std::sync::Arc;

use super::{exec, key_expr, query_rows, OracleFactory, DIALECT};
use crate::{
    config::DataConfig,
    error::{Error, Result},
    format::{self, CsvOptions, JsonOptions, RowData},
    path::FileFormat,
    pool::Pool,
    vfile::ContentSource,
};

pub struct OracleSource {
    pool: Arc<Pool<OracleFactory>>,
    data: DataConfig,
}

impl OracleSource {
    pub fn new(pool: Arc<Pool<OracleFactory>>, data: DataConfig) -> OracleSource {
        OracleSource { pool, data }
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions { include_header: self.data.include_csv_header, ..CsvOptions::default() }
    }

    fn json_options(&self) -> JsonOptions {
        JsonOptions { pretty: self.data.pretty_json, ..JsonOptions::default() }
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&conn, sql)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.into_iter().next().flatten())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

impl ContentSource for OracleSource {
    fn fetch_object(&self, database: &str, object: &str, format: FileFormat) -> Result<String> {
        let conn = self.pool.acquire()?;
        let mut sql = format!("SELECT * FROM {}", DIALECT.qualified(Some(database), object));
        if self.data.max_rows_per_file > 0 {
            sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", self.data.max_rows_per_file));
        }
        let (columns, hints, rows) = query_rows(&conn, &sql)?;
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
            "SELECT * FROM {} WHERE {} = {} FETCH FIRST 1 ROWS ONLY",
            DIALECT.qualified(Some(database), table),
            key_expr(pk_column),
            DIALECT.quote_literal(row_id)
        );
        let (columns, hints, rows) = query_rows(&conn, &sql)?;
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
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = {} FETCH FIRST 1 ROWS ONLY",
            DIALECT.qualified(Some(database), table),
            key_expr(pk_column),
            DIALECT.quote_literal(row_id)
        );
        let (_, _, rows) = query_rows(&conn, &sql)?;
        Ok(!rows.is_empty())
    }

    fn database_info(&self, database: &str) -> Result<String> {
        let owner = DIALECT.quote_literal(database);
        let created = {
            let conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(
                &conn,
                &format!(
                    "SELECT TO_CHAR(created, 'YYYY-MM-DD HH24:MI:SS') FROM all_users \
                     WHERE username = {}",
                    owner
                ),
            )?;
            match rows.into_iter().next().and_then(|r| r.into_iter().next().flatten()) {
                Some(created) => created,
                None => return Ok("Schema not found\n".to_string()),
            }
        };

        let tables =
            self.count(&format!("SELECT COUNT(*) FROM all_tables WHERE owner = {}", owner))?;
        let views =
            self.count(&format!("SELECT COUNT(*) FROM all_views WHERE owner = {}", owner))?;
        let procedures = self.count(&format!(
            "SELECT COUNT(*) FROM all_objects WHERE owner = {} AND object_type = 'PROCEDURE'",
            owner
        ))?;
        let functions = self.count(&format!(
            "SELECT COUNT(*) FROM all_objects WHERE owner = {} AND object_type = 'FUNCTION'",
            owner
        ))?;
        let triggers =
            self.count(&format!("SELECT COUNT(*) FROM all_triggers WHERE owner = {}", owner))?;

        let mut out = String::new();
        out.push_str(&format!("Schema: {}\n", database));
        out.push_str(&format!("Created: {}\n", created));
        out.push_str("\nObjects:\n");
        out.push_str(&format!("  Tables: {}\n", tables));
        out.push_str(&format!("  Views: {}\n", views));
        out.push_str(&format!("  Procedures: {}\n", procedures));
        out.push_str(&format!("  Functions: {}\n", functions));
        out.push_str(&format!("  Triggers: {}\n", triggers));
        Ok(out)
    }

    fn user_info(&self, name: &str) -> Result<String> {
        let user = name.split('@').next().unwrap_or(name);
        let conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(
            &conn,
            &format!(
                "SELECT username, TO_CHAR(created, 'YYYY-MM-DD HH24:MI:SS') FROM all_users \
                 WHERE username = {}",
                DIALECT.quote_literal(user)
            ),
        )?;
        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Err(Error::not_found(format!("user {} not found", user))),
        };
        let cell = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();

        let mut out = String::new();
        out.push_str(&format!("User: {}\n", cell(0)));
        out.push_str(&format!("Created: {}\n", cell(1)));
        Ok(out)
    }

    fn insert_rows(&self, database: &str, table: &str, rows: &[RowData]) -> Result<u64> {
        let conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        let mut affected = 0u64;
        for row in rows {
            affected += exec(&conn, &format::build_insert(&DIALECT, &qualified, row))?;
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
        let conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        let sql = if pk_column == "ROWID" {
            rowid_update(&qualified, row, row_id)
        } else {
            format::build_update(&DIALECT, &qualified, row, pk_column, row_id)
        };
        exec(&conn, &sql)
    }

    fn delete_row(
        &self,
        database: &str,
        table: &str,
        pk_column: &str,
        row_id: &str,
    ) -> Result<u64> {
        let conn = self.pool.acquire()?;
        let qualified = DIALECT.qualified(Some(database), table);
        let sql = if pk_column == "ROWID" {
            format!(
                "DELETE FROM {} WHERE ROWID = {}",
                qualified,
                DIALECT.quote_literal(row_id)
            )
        } else {
            format::build_delete(&DIALECT, &qualified, pk_column, row_id)
        };
        exec(&conn, &sql)
    }
}

/// An update addressed by the ROWID pseudocolumn, which the generic
/// builder would wrongly quote.
fn rowid_update(qualified: &str, row: &RowData, row_id: &str) -> String {
    let assignments: Vec<String> = row
        .iter()
        .filter(|(name, _)| name.as_str() != "ROWID")
        .map(|(name, value)| {
            format!("{} = {}", DIALECT.quote_identifier(name), DIALECT.sql_value(value))
        })
        .collect();
    format!(
        "UPDATE {} SET {} WHERE ROWID = {}",
        qualified,
        assignments.join(", "),
        DIALECT.quote_literal(row_id)
    )
}
