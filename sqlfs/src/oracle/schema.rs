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

//! Schema manager over the `ALL_*` data dictionary views.

use std::{collections::BTreeMap, sync::Arc};

use super::{key_expr, query_rows, OracleFactory, OraclePool, DIALECT, SYSTEM_DATABASES};
use crate::{
    cache::{CacheCategory, CacheManager},
    error::{Error, ErrorContext, Result},
    pool::{with_retry, ConnectionPool, Pool},
    schema::{
        cached, ColumnInfo, IndexInfo, ObjectKind, RoutineInfo, RoutineKind, SchemaManager,
        ServerInfo, TableInfo, TriggerInfo, UserInfo, ViewInfo,
    },
};

pub struct OracleSchemaManager {
    pool: Arc<Pool<OracleFactory>>,
    cache: Arc<CacheManager>,
    facade: Arc<OraclePool>,
}

impl OracleSchemaManager {
    pub fn new(
        pool: Arc<Pool<OracleFactory>>,
        cache: Arc<CacheManager>,
        facade: Arc<OraclePool>,
    ) -> OracleSchemaManager {
        OracleSchemaManager { pool, cache, facade }
    }

    fn names(&self, sql: &str) -> Result<Vec<String>> {
        with_retry(|| {
            let conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&conn, sql)?;
            Ok(rows.into_iter().filter_map(|r| r.into_iter().next().flatten()).collect())
        })
    }

    fn scalar(&self, sql: &str) -> Result<Option<String>> {
        let conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&conn, sql)?;
        Ok(rows.into_iter().next().and_then(|r| r.into_iter().next().flatten()))
    }

    fn object_names(&self, owner: &str, object_type: &str) -> Result<Vec<String>> {
        self.names(&format!(
            "SELECT object_name FROM all_objects WHERE owner = {} AND object_type = {} \
             ORDER BY object_name",
            DIALECT.quote_literal(owner),
            DIALECT.quote_literal(object_type)
        ))
    }

    fn primary_key_columns(&self, owner: &str, table: &str) -> Result<Vec<String>> {
        self.names(&format!(
            "SELECT acc.column_name FROM all_constraints ac \
             JOIN all_cons_columns acc ON ac.constraint_name = acc.constraint_name \
              AND ac.owner = acc.owner \
             WHERE ac.constraint_type = 'P' AND ac.owner = {} AND ac.table_name = {} \
             ORDER BY acc.position",
            DIALECT.quote_literal(owner),
            DIALECT.quote_literal(table)
        ))
    }
}

impl SchemaManager for OracleSchemaManager {
    fn list_databases(&self) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_databases");
        cached(&self.cache, "databases", CacheCategory::Schema, || {
            self.names("SELECT DISTINCT owner FROM all_tables ORDER BY owner")
        })
    }

    fn database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.list_databases()?.iter().any(|db| db == database))
    }

    fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_tables");
        cached(&self.cache, &format!("{}/tables", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT table_name FROM all_tables WHERE owner = {} ORDER BY table_name",
                DIALECT.quote_literal(database)
            ))
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
                "SELECT num_rows, blocks, TO_CHAR(last_analyzed, 'YYYY-MM-DD HH24:MI:SS') \
                 FROM all_tables WHERE owner = {} AND table_name = {}",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let row = {
                let conn = self.pool.acquire()?;
                let (_, _, rows) = query_rows(&conn, &sql)?;
                match rows.into_iter().next() {
                    Some(row) => row,
                    None => return Ok(None),
                }
            };
            let cell = |i: usize| row.get(i).cloned().flatten();
            let number =
                |i: usize| cell(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

            let columns = self.list_columns(database, table)?;
            let indexes = self.list_indexes(database, table)?;
            let primary_key = self
                .primary_key_columns(database, table)?
                .into_iter()
                .next()
                // Heap rows are always addressable by ROWID.
                .unwrap_or_else(|| "ROWID".to_string());

            Ok(Some(TableInfo {
                name: table.to_string(),
                database: database.to_string(),
                rows_estimate: number(0),
                data_length: number(1) * 8192,
                update_time: cell(2).unwrap_or_default(),
                columns,
                indexes,
                primary_key,
                ..TableInfo::default()
            }))
        })
    }

    fn list_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let _ctx = ErrorContext::enter("list_columns");
        let key = format!("{}/tables/{}/columns", database, table);
        cached(&self.cache, &key, CacheCategory::Metadata, || {
            let primary = self.primary_key_columns(database, table)?;
            let sql = format!(
                "SELECT column_name, data_type, data_length, data_precision, data_scale, \
                 nullable, data_default, column_id FROM all_tab_columns \
                 WHERE owner = {} AND table_name = {} ORDER BY column_id",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&conn, &sql)?;
            Ok(rows
                .into_iter()
                .map(|row| {
                    let cell = |i: usize| row.get(i).cloned().flatten();
                    let name = cell(0).unwrap_or_default();
                    let data_type = cell(1).unwrap_or_default();
                    let full_type = match (cell(3), cell(4)) {
                        (Some(precision), Some(scale)) if scale != "0" => {
                            format!("{}({},{})", data_type, precision, scale)
                        }
                        (Some(precision), _) => format!("{}({})", data_type, precision),
                        _ => match cell(2) {
                            Some(length) if data_type.contains("CHAR") => {
                                format!("{}({})", data_type, length)
                            }
                            _ => data_type.clone(),
                        },
                    };
                    ColumnInfo {
                        key: if primary.iter().any(|p| *p == name) {
                            "PRI".to_string()
                        } else {
                            String::new()
                        },
                        name,
                        type_name: data_type,
                        full_type,
                        nullable: cell(5).as_deref() == Some("Y"),
                        default_value: cell(6),
                        ordinal: cell(7).and_then(|v| v.parse().ok()).unwrap_or(0),
                        ..ColumnInfo::default()
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
                "SELECT ai.index_name, ai.uniqueness, ai.index_type, aic.column_name \
                 FROM all_indexes ai \
                 JOIN all_ind_columns aic ON ai.index_name = aic.index_name \
                  AND ai.owner = aic.index_owner \
                 WHERE ai.owner = {} AND ai.table_name = {} \
                 ORDER BY ai.index_name, aic.column_position",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&conn, &sql)?;

            let primary = self.primary_key_columns(database, table)?;
            let mut indexes: Vec<IndexInfo> = Vec::new();
            for row in rows {
                let cell = |i: usize| row.get(i).cloned().flatten();
                let name = cell(0).unwrap_or_default();
                let column = cell(3).unwrap_or_default();
                match indexes.last_mut() {
                    Some(last) if last.name == name => last.columns.push(column),
                    _ => indexes.push(IndexInfo {
                        unique: cell(1).as_deref() == Some("UNIQUE"),
                        primary: !primary.is_empty() && primary == vec![column.clone()],
                        name,
                        columns: vec![column],
                        index_type: cell(2).unwrap_or_default(),
                        ..IndexInfo::default()
                    }),
                }
            }
            Ok(indexes)
        })
    }

    fn list_views(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_views");
        cached(&self.cache, &format!("{}/views", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT view_name FROM all_views WHERE owner = {} ORDER BY view_name",
                DIALECT.quote_literal(database)
            ))
        })
    }

    fn describe_view(&self, database: &str, view: &str) -> Result<Option<ViewInfo>> {
        let _ctx = ErrorContext::enter("describe_view");
        let exists = self.list_views(database)?.iter().any(|v| v == view);
        Ok(exists.then(|| ViewInfo {
            name: view.to_string(),
            database: database.to_string(),
            ..ViewInfo::default()
        }))
    }

    fn list_procedures(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_procedures");
        cached(&self.cache, &format!("{}/procedures", database), CacheCategory::Schema, || {
            self.object_names(database, "PROCEDURE")
        })
    }

    fn list_functions(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_functions");
        cached(&self.cache, &format!("{}/functions", database), CacheCategory::Schema, || {
            self.object_names(database, "FUNCTION")
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
            "SELECT object_name, TO_CHAR(created, 'YYYY-MM-DD HH24:MI:SS'), \
             TO_CHAR(last_ddl_time, 'YYYY-MM-DD HH24:MI:SS') FROM all_objects \
             WHERE owner = {} AND object_name = {} AND object_type = {}",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(name),
            DIALECT.quote_literal(kind.as_str())
        );
        let conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&conn, &sql)?;
        Ok(rows.into_iter().next().map(|row| {
            let cell = |i: usize| row.get(i).cloned().flatten();
            RoutineInfo {
                name: name.to_string(),
                database: database.to_string(),
                kind: kind.as_str().to_string(),
                created: cell(1).unwrap_or_default(),
                modified: cell(2).unwrap_or_default(),
                ..RoutineInfo::default()
            }
        }))
    }

    fn list_triggers(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_triggers");
        cached(&self.cache, &format!("{}/triggers", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT trigger_name FROM all_triggers WHERE owner = {} ORDER BY trigger_name",
                DIALECT.quote_literal(database)
            ))
        })
    }

    fn describe_trigger(&self, database: &str, trigger: &str) -> Result<Option<TriggerInfo>> {
        let _ctx = ErrorContext::enter("describe_trigger");
        let sql = format!(
            "SELECT table_name, triggering_event, trigger_type FROM all_triggers \
             WHERE owner = {} AND trigger_name = {}",
            DIALECT.quote_literal(database),
            DIALECT.quote_literal(trigger)
        );
        let conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&conn, &sql)?;
        Ok(rows.into_iter().next().map(|row| {
            let cell = |i: usize| row.get(i).cloned().flatten();
            let trigger_type = cell(2).unwrap_or_default();
            TriggerInfo {
                name: trigger.to_string(),
                database: database.to_string(),
                table: cell(0).unwrap_or_default(),
                event: cell(1).unwrap_or_default(),
                timing: trigger_type.split(' ').next().unwrap_or("").to_string(),
                ..TriggerInfo::default()
            }
        }))
    }

    fn create_statement(&self, database: &str, object: &str, kind: ObjectKind) -> Result<String> {
        let _ctx = ErrorContext::enter("create_statement");
        let sql = format!(
            "SELECT DBMS_METADATA.GET_DDL({}, {}, {}) FROM DUAL",
            DIALECT.quote_literal(kind.as_str()),
            DIALECT.quote_literal(object),
            DIALECT.quote_literal(database)
        );
        self.scalar(&sql)?.ok_or_else(|| {
            Error::not_found(format!("{} {}.{} not found", kind.as_str(), database, object))
        })
    }

    fn server_info(&self) -> Result<ServerInfo> {
        let _ctx = ErrorContext::enter("server_info");
        let mut info = ServerInfo::default();
        info.version = self
            .scalar("SELECT banner FROM v$version WHERE ROWNUM = 1")?
            .unwrap_or_default();
        info.version_comment = "Oracle".to_string();
        // v$instance needs SELECT_CATALOG_ROLE; degrade gracefully.
        if let Ok(Some(hostname)) = self.scalar("SELECT host_name FROM v$instance") {
            info.hostname = hostname;
        }
        if let Ok(Some(uptime)) = self.scalar(
            "SELECT TRUNC((SYSDATE - startup_time) * 86400) FROM v$instance",
        ) {
            info.uptime = uptime.parse().unwrap_or(0);
        }
        if let Ok(Some(sessions)) = self.scalar("SELECT COUNT(*) FROM v$session") {
            info.threads_connected = sessions.parse().unwrap_or(0);
        }
        Ok(info)
    }

    fn list_users(&self) -> Result<Vec<UserInfo>> {
        let _ctx = ErrorContext::enter("list_users");
        cached(&self.cache, "users", CacheCategory::Metadata, || {
            let names = self.names("SELECT username FROM all_users ORDER BY username")?;
            Ok(names
                .into_iter()
                .map(|user| UserInfo { user, ..UserInfo::default() })
                .collect())
        })
    }

    fn global_variables(&self) -> Result<BTreeMap<String, String>> {
        let _ctx = ErrorContext::enter("global_variables");
        self.variables()
    }

    fn session_variables(&self) -> Result<BTreeMap<String, String>> {
        let _ctx = ErrorContext::enter("session_variables");
        self.variables()
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
        let key = format!("{}/tables/{}/rowids/{}/{}", database, table, limit, offset);
        cached(&self.cache, &key, CacheCategory::Data, || {
            let pk = key_expr(&info.primary_key);
            self.names(&format!(
                "SELECT {} FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                pk,
                DIALECT.qualified(Some(database), table),
                pk,
                offset,
                limit
            ))
        })
    }

    fn row_count(&self, database: &str, table: &str) -> Result<u64> {
        let _ctx = ErrorContext::enter("row_count");
        let key = format!("{}/tables/{}/rowcount", database, table);
        cached(&self.cache, &key, CacheCategory::Data, || {
            Ok(self
                .scalar(&format!(
                    "SELECT COUNT(*) FROM {}",
                    DIALECT.qualified(Some(database), table)
                ))?
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

impl OracleSchemaManager {
    fn variables(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.pool.acquire()?;
        let (_, _, rows) =
            query_rows(&conn, "SELECT name, value FROM v$parameter ORDER BY name")?;
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
