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

//! Statement execution for PostgreSQL virtual files.

use std::sync::Arc;

use super::{exec, query_rows, PgFactory, DIALECT};
use crate::{
    config::DataConfig,
    error::{Error, Result},
    format::{self, CsvOptions, JsonOptions, RowData},
    path::FileFormat,
    pool::Pool,
    vfile::ContentSource,
};

pub struct PgSource {
    pool: Arc<Pool<PgFactory>>,
    data: DataConfig,
}

impl PgSource {
    pub fn new(pool: Arc<Pool<PgFactory>>, data: DataConfig) -> PgSource {
        PgSource { pool, data }
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions { include_header: self.data.include_csv_header, ..CsvOptions::default() }
    }

    fn json_options(&self) -> JsonOptions {
        JsonOptions { pretty: self.data.pretty_json, ..JsonOptions::default() }
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, sql)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.into_iter().next().flatten())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

impl ContentSource for PgSource {
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
        let schema = DIALECT.quote_literal(database);
        let owner = {
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(
                &mut conn,
                &format!(
                    "SELECT schema_owner FROM information_schema.schemata \
                     WHERE schema_name = {}",
                    schema
                ),
            )?;
            match rows.into_iter().next().and_then(|r| r.into_iter().next().flatten()) {
                Some(owner) => owner,
                None => return Ok("Database not found\n".to_string()),
            }
        };

        let tables = self.count(&format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE'",
            schema
        ))?;
        let views = self.count(&format!(
            "SELECT COUNT(*) FROM information_schema.views WHERE table_schema = {}",
            schema
        ))?;
        let routines = self.count(&format!(
            "SELECT COUNT(*) FROM information_schema.routines WHERE routine_schema = {}",
            schema
        ))?;
        let triggers = self.count(&format!(
            "SELECT COUNT(DISTINCT trigger_name) FROM information_schema.triggers \
             WHERE trigger_schema = {}",
            schema
        ))?;

        let mut out = String::new();
        out.push_str(&format!("Schema: {}\n", database));
        out.push_str(&format!("Owner: {}\n", owner));
        out.push_str("\nObjects:\n");
        out.push_str(&format!("  Tables: {}\n", tables));
        out.push_str(&format!("  Views: {}\n", views));
        out.push_str(&format!("  Routines: {}\n", routines));
        out.push_str(&format!("  Triggers: {}\n", triggers));
        Ok(out)
    }

    fn user_info(&self, name: &str) -> Result<String> {
        let user = name.split('@').next().unwrap_or(name);
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(
            &mut conn,
            &format!(
                "SELECT rolname, rolsuper::int, rolcreatedb::int, rolconnlimit \
                 FROM pg_roles WHERE rolname = {}",
                DIALECT.quote_literal(user)
            ),
        )?;
        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Err(Error::not_found(format!("role {} not found", user))),
        };
        let cell = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();

        let mut out = String::new();
        out.push_str(&format!("Role: {}\n", cell(0)));
        out.push_str(&format!("Superuser: {}\n", if cell(1) == "1" { "Yes" } else { "No" }));
        out.push_str(&format!("Create DB: {}\n", if cell(2) == "1" { "Yes" } else { "No" }));
        out.push_str(&format!("Connection Limit: {}\n", cell(3)));
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
