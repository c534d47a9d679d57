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

//! Schema manager over information_schema and the `SHOW` commands.

use std::{collections::BTreeMap, sync::Arc};

use super::{query_rows, MySqlFactory, MySqlPool, DIALECT, SYSTEM_DATABASES};
use crate::{
    cache::{CacheCategory, CacheManager},
    error::{Error, ErrorContext, Result},
    pool::{with_retry, ConnectionPool, Pool},
    schema::{
        cached, ColumnInfo, IndexInfo, ObjectKind, RoutineInfo, RoutineKind, SchemaManager,
        ServerInfo, TableInfo, TriggerInfo, UserInfo, ViewInfo,
    },
};

pub struct MySqlSchemaManager {
    pool: Arc<Pool<MySqlFactory>>,
    cache: Arc<CacheManager>,
    facade: Arc<MySqlPool>,
}

impl MySqlSchemaManager {
    pub fn new(
        pool: Arc<Pool<MySqlFactory>>,
        cache: Arc<CacheManager>,
        facade: Arc<MySqlPool>,
    ) -> MySqlSchemaManager {
        MySqlSchemaManager { pool, cache, facade }
    }

    fn names(&self, sql: &str) -> Result<Vec<String>> {
        with_retry(|| {
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, sql)?;
            Ok(rows.into_iter().filter_map(|r| r.into_iter().next().flatten()).collect())
        })
    }

    fn object_names(&self, database: &str, table_type: &str) -> Result<Vec<String>> {
        self.names(&format!(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = {} ORDER BY TABLE_NAME",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(table_type)
        ))
    }

    fn routine_names(&self, database: &str, routine_type: &str) -> Result<Vec<String>> {
        self.names(&format!(
            "SELECT ROUTINE_NAME FROM INFORMATION_SCHEMA.ROUTINES \
             WHERE ROUTINE_SCHEMA = {} AND ROUTINE_TYPE = {} ORDER BY ROUTINE_NAME",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(routine_type)
        ))
    }
}

impl SchemaManager for MySqlSchemaManager {
    fn list_databases(&self) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_databases");
        cached(&self.cache, "databases", CacheCategory::Schema, || {
            self.names("SHOW DATABASES")
        })
    }

    fn database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.list_databases()?.iter().any(|db| db == database))
    }

    fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_tables");
        cached(&self.cache, &format!("{}/tables", database), CacheCategory::Schema, || {
            self.object_names(database, "BASE TABLE")
        })
    }

    fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        Ok(self.list_tables(database)?.iter().any(|t| t == table))
    }

    fn describe_table(&self, database: &str, table: &str) -> Result<Option<TableInfo>> {
        let _ctx = ErrorContext::enter("describe_table");
        let key = format!("{}/tables/{}/info", database, table);
        cached(&self.cache, &key, CacheCategory::Metadata, || {
            let sql = format!(
                "SELECT TABLE_NAME, ENGINE, TABLE_COLLATION, TABLE_COMMENT, TABLE_ROWS, \
                 DATA_LENGTH, INDEX_LENGTH, AUTO_INCREMENT, CREATE_TIME, UPDATE_TIME \
                 FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {}",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, &sql)?;
            let row = match rows.into_iter().next() {
                Some(row) => row,
                None => return Ok(None),
            };
            drop(conn);

            let cell = |i: usize| row.get(i).cloned().flatten();
            let number = |i: usize| cell(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            let columns = self.list_columns(database, table)?;
            let indexes = self.list_indexes(database, table)?;
            let primary_key = columns
                .iter()
                .find(|c| c.key == "PRI")
                .map(|c| c.name.clone())
                .unwrap_or_default();

            Ok(Some(TableInfo {
                name: table.to_string(),
                database: database.to_string(),
                engine: cell(1).unwrap_or_default(),
                collation: cell(2).unwrap_or_default(),
                comment: cell(3).unwrap_or_default(),
                rows_estimate: number(4),
                data_length: number(5),
                index_length: number(6),
                auto_increment: number(7),
                create_time: cell(8).unwrap_or_default(),
                update_time: cell(9).unwrap_or_default(),
                columns,
                indexes,
                primary_key,
            }))
        })
    }

    fn list_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let _ctx = ErrorContext::enter("list_columns");
        let key = format!("{}/tables/{}/columns", database, table);
        cached(&self.cache, &key, CacheCategory::Metadata, || {
            let sql = format!(
                "SELECT COLUMN_NAME, DATA_TYPE, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, \
                 COLUMN_KEY, EXTRA, COLLATION_NAME, ORDINAL_POSITION \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, &sql)?;
            Ok(rows
                .into_iter()
                .map(|row| {
                    let cell = |i: usize| row.get(i).cloned().flatten();
                    ColumnInfo {
                        name: cell(0).unwrap_or_default(),
                        type_name: cell(1).unwrap_or_default(),
                        full_type: cell(2).unwrap_or_default(),
                        nullable: cell(3).as_deref() == Some("YES"),
                        default_value: cell(4),
                        key: cell(5).unwrap_or_default(),
                        extra: cell(6).unwrap_or_default(),
                        collation: cell(7).unwrap_or_default(),
                        comment: String::new(),
                        ordinal: cell(8).and_then(|v| v.parse().ok()).unwrap_or(0),
                    }
                })
                .collect())
        })
    }

    fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<IndexInfo>> {
        let _ctx = ErrorContext::enter("list_indexes");
        let key = format!("{}/tables/{}/indexes", database, table);
        cached(&self.cache, &key, CacheCategory::Metadata, || {
            let sql = format!(
                "SELECT INDEX_NAME, NON_UNIQUE, SEQ_IN_INDEX, COLUMN_NAME, INDEX_TYPE, \
                 CARDINALITY FROM INFORMATION_SCHEMA.STATISTICS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} \
                 ORDER BY INDEX_NAME, SEQ_IN_INDEX",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, &sql)?;

            let mut indexes: Vec<IndexInfo> = Vec::new();
            for row in rows {
                let cell = |i: usize| row.get(i).cloned().flatten();
                let name = cell(0).unwrap_or_default();
                let column = cell(3).unwrap_or_default();
                match indexes.last_mut() {
                    Some(last) if last.name == name => {
                        last.columns.push(column);
                    }
                    _ => indexes.push(IndexInfo {
                        unique: cell(1).as_deref() == Some("0"),
                        primary: name == "PRIMARY",
                        name,
                        columns: vec![column],
                        index_type: cell(4).unwrap_or_default(),
                        comment: String::new(),
                        cardinality: cell(5)
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0),
                    }),
                }
            }
            Ok(indexes)
        })
    }

    fn list_views(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_views");
        cached(&self.cache, &format!("{}/views", database), CacheCategory::Schema, || {
            self.object_names(database, "VIEW")
        })
    }

    fn describe_view(&self, database: &str, view: &str) -> Result<Option<ViewInfo>> {
        let _ctx = ErrorContext::enter("describe_view");
        let sql = format!(
            "SELECT TABLE_NAME, DEFINER, SECURITY_TYPE, IS_UPDATABLE, CHECK_OPTION \
             FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {}",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(view)
        );
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        Ok(rows.into_iter().next().map(|row| {
            let cell = |i: usize| row.get(i).cloned().flatten();
            ViewInfo {
                name: view.to_string(),
                database: database.to_string(),
                definer: cell(1).unwrap_or_default(),
                security_type: cell(2).unwrap_or_default(),
                is_updatable: cell(3).as_deref() == Some("YES"),
                check_option: cell(4).unwrap_or_default(),
            }
        }))
    }

    fn list_procedures(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_procedures");
        cached(&self.cache, &format!("{}/procedures", database), CacheCategory::Schema, || {
            self.routine_names(database, "PROCEDURE")
        })
    }

    fn list_functions(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_functions");
        cached(&self.cache, &format!("{}/functions", database), CacheCategory::Schema, || {
            self.routine_names(database, "FUNCTION")
        })
    }

    fn describe_routine(
        &self,
        database: &str,
        name: &str,
        kind: RoutineKind,
    ) -> Result<Option<RoutineInfo>> {
        let _ctx = ErrorContext::enter("describe_routine");
        let sql = format!(
            "SELECT ROUTINE_NAME, ROUTINE_TYPE, DEFINER, DATA_TYPE, SQL_DATA_ACCESS, \
             SECURITY_TYPE, IS_DETERMINISTIC, ROUTINE_COMMENT, CREATED, LAST_ALTERED \
             FROM INFORMATION_SCHEMA.ROUTINES \
             WHERE ROUTINE_SCHEMA = {} AND ROUTINE_NAME = {} AND ROUTINE_TYPE = {}",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(name),
            DIALECT.quote_literal(kind.as_str())
        );
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        Ok(rows.into_iter().next().map(|row| {
            let cell = |i: usize| row.get(i).cloned().flatten();
            RoutineInfo {
                name: name.to_string(),
                database: database.to_string(),
                kind: cell(1).unwrap_or_default(),
                definer: cell(2).unwrap_or_default(),
                returns: cell(3).unwrap_or_default(),
                data_access: cell(4).unwrap_or_default(),
                security_type: cell(5).unwrap_or_default(),
                deterministic: cell(6).as_deref() == Some("YES"),
                comment: cell(7).unwrap_or_default(),
                created: cell(8).unwrap_or_default(),
                modified: cell(9).unwrap_or_default(),
            }
        }))
    }

    fn list_triggers(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_triggers");
        cached(&self.cache, &format!("{}/triggers", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT TRIGGER_NAME FROM INFORMATION_SCHEMA.TRIGGERS \
                 WHERE TRIGGER_SCHEMA = {} ORDER BY TRIGGER_NAME",
                DIALECT.quote_literal(database)
            ))
        })
    }

    fn describe_trigger(&self, database: &str, trigger: &str) -> Result<Option<TriggerInfo>> {
        let _ctx = ErrorContext::enter("describe_trigger");
        let sql = format!(
            "SELECT TRIGGER_NAME, EVENT_OBJECT_TABLE, EVENT_MANIPULATION, ACTION_TIMING, \
             ACTION_STATEMENT, DEFINER, CREATED FROM INFORMATION_SCHEMA.TRIGGERS \
             WHERE TRIGGER_SCHEMA = {} AND TRIGGER_NAME = {}",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(trigger)
        );
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        Ok(rows.into_iter().next().map(|row| {
            let cell = |i: usize| row.get(i).cloned().flatten();
            TriggerInfo {
                name: trigger.to_string(),
                database: database.to_string(),
                table: cell(1).unwrap_or_default(),
                event: cell(2).unwrap_or_default(),
                timing: cell(3).unwrap_or_default(),
                statement: cell(4).unwrap_or_default(),
                definer: cell(5).unwrap_or_default(),
                created: cell(6).unwrap_or_default(),
            }
        }))
    }

    fn create_statement(&self, database: &str, object: &str, kind: ObjectKind) -> Result<String> {
        let _ctx = ErrorContext::enter("create_statement");
        // SHOW CREATE puts the DDL in a kind-specific column.
        let (keyword, column) = match kind {
            ObjectKind::Table => ("TABLE", 1),
            ObjectKind::View => ("VIEW", 1),
            ObjectKind::Procedure => ("PROCEDURE", 2),
            ObjectKind::Function => ("FUNCTION", 2),
            ObjectKind::Trigger => ("TRIGGER", 2),
        };
        let sql =
            format!("SHOW CREATE {} {}", keyword, DIALECT.qualified(Some(database), object));
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, &sql)?;
        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().nth(column).flatten())
            .ok_or_else(|| {
                Error::not_found(format!("{} {}.{} not found", kind.as_str(), database, object))
            })
    }

    fn server_info(&self) -> Result<ServerInfo> {
        let _ctx = ErrorContext::enter("server_info");
        let mut conn = self.pool.acquire()?;
        let mut info = ServerInfo::default();

        let (_, _, rows) = query_rows(&mut conn, "SELECT VERSION(), @@hostname, @@port")?;
        if let Some(row) = rows.into_iter().next() {
            let cell = |i: usize| row.get(i).cloned().flatten();
            info.version = cell(0).unwrap_or_default();
            info.hostname = cell(1).unwrap_or_default();
            info.port = cell(2).and_then(|v| v.parse().ok()).unwrap_or(0);
        }

        let (_, _, rows) = query_rows(&mut conn, "SELECT @@version_comment")?;
        if let Some(row) = rows.into_iter().next() {
            info.version_comment = row.into_iter().next().flatten().unwrap_or_default();
        }

        let (_, _, rows) = query_rows(
            &mut conn,
            "SHOW GLOBAL STATUS WHERE Variable_name IN \
             ('Uptime', 'Threads_connected', 'Threads_running', 'Questions', 'Slow_queries')",
        )?;
        for row in rows {
            let cell = |i: usize| row.get(i).cloned().flatten();
            let value = cell(1).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            match cell(0).unwrap_or_default().as_str() {
                "Uptime" => info.uptime = value,
                "Threads_connected" => info.threads_connected = value,
                "Threads_running" => info.threads_running = value,
                "Questions" => info.questions = value,
                "Slow_queries" => info.slow_queries = value,
                _ => {}
            }
        }
        Ok(info)
    }

    fn list_users(&self) -> Result<Vec<UserInfo>> {
        let _ctx = ErrorContext::enter("list_users");
        cached(&self.cache, "users", CacheCategory::Metadata, || {
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(
                &mut conn,
                "SELECT User, Host, account_locked, password_expired FROM mysql.user \
                 ORDER BY User, Host",
            )?;
            Ok(rows
                .into_iter()
                .map(|row| {
                    let cell = |i: usize| row.get(i).cloned().flatten();
                    UserInfo {
                        user: cell(0).unwrap_or_default(),
                        host: cell(1).unwrap_or_default(),
                        account_locked: cell(2).as_deref() == Some("Y"),
                        password_expired: cell(3).unwrap_or_default(),
                    }
                })
                .collect())
        })
    }

    fn global_variables(&self) -> Result<BTreeMap<String, String>> {
        let _ctx = ErrorContext::enter("global_variables");
        self.variables("SHOW GLOBAL VARIABLES")
    }

    fn session_variables(&self) -> Result<BTreeMap<String, String>> {
        let _ctx = ErrorContext::enter("session_variables");
        self.variables("SHOW SESSION VARIABLES")
    }

    fn row_ids(
        &self,
        database: &str,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("row_ids");
        let info = match self.describe_table(database, table)? {
            Some(info) => info,
            None => return Ok(Vec::new()),
        };
        if info.primary_key.is_empty() {
            return Ok(Vec::new());
        }
        let key = format!("{}/tables/{}/rowids/{}/{}", database, table, limit, offset);
        cached(&self.cache, &key, CacheCategory::Data, || {
            let pk = DIALECT.quote_identifier(&info.primary_key);
            self.names(&format!(
                "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
                pk,
                DIALECT.qualified(Some(database), table),
                pk,
                limit,
                offset
            ))
        })
    }

    fn row_count(&self, database: &str, table: &str) -> Result<u64> {
        let _ctx = ErrorContext::enter("row_count");
        let key = format!("{}/tables/{}/rowcount", database, table);
        cached(&self.cache, &key, CacheCategory::Data, || {
            let mut conn = self.pool.acquire()?;
            let sql =
                format!("SELECT COUNT(*) FROM {}", DIALECT.qualified(Some(database), table));
            let (_, _, rows) = query_rows(&mut conn, &sql)?;
            Ok(rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next().flatten())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0))
        })
    }

    fn invalidate_table(&self, database: &str, table: &str) {
        self.cache.invalidate_table(database, table);
    }

    fn invalidate_database(&self, database: &str) {
        self.cache.invalidate_database(database);
    }

    fn invalidate_all(&self) {
        self.cache.clear();
    }

    fn system_databases(&self) -> &'static [&'static str] {
        SYSTEM_DATABASES
    }

    fn connection_pool(&self) -> Arc<dyn ConnectionPool> {
        self.facade.clone()
    }
}

impl MySqlSchemaManager {
    fn variables(&self, sql: &str) -> Result<BTreeMap<String, String>> {
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, sql)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter();
                let name = cells.next().flatten()?;
                let value = cells.next().flatten().unwrap_or_default();
                Some((name, value))
            })
            .collect())
    }
}
