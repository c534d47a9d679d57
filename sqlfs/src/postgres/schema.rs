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

//! Schema manager over `information_schema` and `pg_catalog`.

use std::{collections::BTreeMap, sync::Arc};

use super::{query_rows, PgFactory, PgPool, DIALECT, SYSTEM_DATABASES};
use crate::{
    cache::{CacheCategory, CacheManager},
    error::{Error, ErrorContext, Result},
    pool::{with_retry, ConnectionPool, Pool},
    schema::{
        cached, ColumnInfo, IndexInfo, ObjectKind, RoutineInfo, RoutineKind, SchemaManager,
        ServerInfo, TableInfo, TriggerInfo, UserInfo, ViewInfo,
    },
};

pub struct PgSchemaManager {
    pool: Arc<Pool<PgFactory>>,
    cache: Arc<CacheManager>,
    facade: Arc<PgPool>,
}

impl PgSchemaManager {
    pub fn new(
        pool: Arc<Pool<PgFactory>>,
        cache: Arc<CacheManager>,
        facade: Arc<PgPool>,
    ) -> PgSchemaManager {
        PgSchemaManager { pool, cache, facade }
    }

    fn names(&self, sql: &str) -> Result<Vec<String>> {
        with_retry(|| {
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, sql)?;
            Ok(rows.into_iter().filter_map(|r| r.into_iter().next().flatten()).collect())
        })
    }

    fn scalar(&self, sql: &str) -> Result<Option<String>> {
        let mut conn = self.pool.acquire()?;
        let (_, _, rows) = query_rows(&mut conn, sql)?;
        Ok(rows.into_iter().next().and_then(|r| r.into_iter().next().flatten()))
    }

    fn primary_key_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        self.names(&format!(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = {} AND tc.table_name = {} \
             ORDER BY kcu.ordinal_position",
            DIALECT.quote_literal(schema),
            DIALECT.quote_literal(table)
        ))
    }
}

impl SchemaManager for PgSchemaManager {
    fn list_databases(&self) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_databases");
        cached(&self.cache, "databases", CacheCategory::Schema, || {
            self.names(
                "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name",
            )
        })
    }

    fn database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.list_databases()?.iter().any(|db| db == database))
    }

    fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_tables");
        cached(&self.cache, &format!("{}/tables", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY table_name",
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
            if !self.table_exists(database, table)? {
                return Ok(None);
            }
            let columns = self.list_columns(database, table)?;
            let indexes = self.list_indexes(database, table)?;
            let primary_key = self
                .primary_key_columns(database, table)?
                .into_iter()
                .next()
                // Every heap table can address rows by ctid.
                .unwrap_or_else(|| "ctid".to_string());

            let sql = format!(
                "SELECT c.reltuples::bigint, pg_relation_size(c.oid), pg_indexes_size(c.oid) \
                 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = {} AND c.relname = {}",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, &sql)?;
            let row = rows.into_iter().next().unwrap_or_default();
            let number = |i: usize| {
                row.get(i)
                    .cloned()
                    .flatten()
                    .and_then(|v| v.parse::<i64>().ok())
                    .map(|v| v.max(0) as u64)
                    .unwrap_or(0)
            };

            Ok(Some(TableInfo {
                name: table.to_string(),
                database: database.to_string(),
                rows_estimate: number(0),
                data_length: number(1),
                index_length: number(2),
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
                "SELECT column_name, data_type, udt_name, is_nullable, column_default, \
                 ordinal_position, character_maximum_length \
                 FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
                DIALECT.quote_literal(database),
                DIALECT.quote_literal(table)
            );
            let mut conn = self.pool.acquire()?;
            let (_, _, rows) = query_rows(&mut conn, &sql)?;
            Ok(rows
                .into_iter()
                .map(|row| {
                    let cell = |i: usize| row.get(i).cloned().flatten();
                    let name = cell(0).unwrap_or_default();
                    let data_type = cell(1).unwrap_or_default();
                    let full_type = match cell(6) {
                        Some(len) => format!("{}({})", data_type, len),
                        None => data_type.clone(),
                    };
                    ColumnInfo {
                        key: if primary.iter().any(|p| *p == name) {
                            "PRI".to_string()
                        } else {
                            String::new()
                        },
                        name,
                        type_name: cell(2).unwrap_or(data_type),
                        full_type,
                        nullable: cell(3).as_deref() == Some("YES"),
                        default_value: cell(4),
                        ordinal: cell(5).and_then(|v| v.parse().ok()).unwrap_or(0),
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
                "SELECT i.relname, ix.indisunique::int, ix.indisprimary::int, a.attname, \
                 am.amname \
                 FROM pg_class t \
                 JOIN pg_namespace n ON n.oid = t.relnamespace \
                 JOIN pg_index ix ON ix.indrelid = t.oid \
                 JOIN pg_class i ON i.oid = ix.indexrelid \
                 JOIN pg_am am ON am.oid = i.relam \
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
                 WHERE n.nspname = {} AND t.relname = {} \
                 ORDER BY i.relname, a.attnum",
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
                    Some(last) if last.name == name => last.columns.push(column),
                    _ => indexes.push(IndexInfo {
                        unique: cell(1).as_deref() == Some("1"),
                        primary: cell(2).as_deref() == Some("1"),
                        name,
                        columns: vec![column],
                        index_type: cell(4).unwrap_or_default().to_uppercase(),
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
                "SELECT table_name FROM information_schema.views \
                 WHERE table_schema = {} ORDER BY table_name",
                DIALECT.quote_literal(database)
            ))
        })
    }

    fn describe_view(&self, database: &str, view: &str) -> Result<Option<ViewInfo>> {
        let _ctx = ErrorContext::enter("describe_view");
        let sql = format!(
            "SELECT is_updatable, check_option FROM information_schema.views \
             WHERE table_schema = {} AND table_name = {}",
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
                is_updatable: cell(0).as_deref() == Some("YES"),
                check_option: cell(1).unwrap_or_default(),
                ..ViewInfo::default()
            }
        }))
    }

    fn list_procedures(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_procedures");
        cached(&self.cache, &format!("{}/procedures", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT routine_name FROM information_schema.routines \
                 WHERE routine_schema = {} AND routine_type = 'PROCEDURE' \
                 ORDER BY routine_name",
                DIALECT.quote_literal(database)
            ))
        })
    }

    fn list_functions(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_functions");
        cached(&self.cache, &format!("{}/functions", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT routine_name FROM information_schema.routines \
                 WHERE routine_schema = {} AND routine_type = 'FUNCTION' \
                 ORDER BY routine_name",
                DIALECT.quote_literal(database)
            ))
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
            "SELECT routine_name, routine_type, data_type, security_type \
             FROM information_schema.routines \
             WHERE routine_schema = {} AND routine_name = {} AND routine_type = {}",
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
                returns: cell(2).unwrap_or_default(),
                security_type: cell(3).unwrap_or_default(),
                ..RoutineInfo::default()
            }
        }))
    }

    fn list_triggers(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_triggers");
        cached(&self.cache, &format!("{}/triggers", database), CacheCategory::Schema, || {
            self.names(&format!(
                "SELECT DISTINCT trigger_name FROM information_schema.triggers \
                 WHERE trigger_schema = {} ORDER BY trigger_name",
                DIALECT.quote_literal(database)
            ))
        })
    }

    fn describe_trigger(&self, database: &str, trigger: &str) -> Result<Option<TriggerInfo>> {
        let _ctx = ErrorContext::enter("describe_trigger");
        let sql = format!(
            "SELECT trigger_name, event_object_table, event_manipulation, action_timing, \
             action_statement FROM information_schema.triggers \
             WHERE trigger_schema = {} AND trigger_name = {} LIMIT 1",
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
                ..TriggerInfo::default()
            }
        }))
    }

    fn create_statement(&self, database: &str, object: &str, kind: ObjectKind) -> Result<String> {
        let _ctx = ErrorContext::enter("create_statement");
        let missing = || {
            Error::not_found(format!("{} {}.{} not found", kind.as_str(), database, object))
        };
        match kind {
            // PostgreSQL has no SHOW CREATE TABLE; synthesize from the
            // catalog the way psql's \d does.
            ObjectKind::Table => {
                let columns = self.list_columns(database, object)?;
                if columns.is_empty() {
                    return Err(missing());
                }
                let mut lines = Vec::with_capacity(columns.len() + 1);
                for column in &columns {
                    let mut line = format!(
                        "    {} {}",
                        DIALECT.quote_identifier(&column.name),
                        column.full_type
                    );
                    if !column.nullable {
                        line.push_str(" NOT NULL");
                    }
                    if let Some(default) = &column.default_value {
                        line.push_str(&format!(" DEFAULT {}", default));
                    }
                    lines.push(line);
                }
                let primary = self.primary_key_columns(database, object)?;
                if !primary.is_empty() {
                    let quoted: Vec<String> =
                        primary.iter().map(|c| DIALECT.quote_identifier(c)).collect();
                    lines.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
                }
                Ok(format!(
                    "CREATE TABLE {} (\n{}\n)",
                    DIALECT.qualified(Some(database), object),
                    lines.join(",\n")
                ))
            }
            ObjectKind::View => {
                let definition = self
                    .scalar(&format!(
                        "SELECT pg_get_viewdef(c.oid, true) FROM pg_class c \
                         JOIN pg_namespace n ON n.oid = c.relnamespace \
                         WHERE n.nspname = {} AND c.relname = {}",
                        DIALECT.quote_literal(database),
                        DIALECT.quote_literal(object)
                    ))?
                    .ok_or_else(missing)?;
                Ok(format!(
                    "CREATE VIEW {} AS\n{}",
                    DIALECT.qualified(Some(database), object),
                    definition
                ))
            }
            ObjectKind::Procedure | ObjectKind::Function => self
                .scalar(&format!(
                    "SELECT pg_get_functiondef(p.oid) FROM pg_proc p \
                     JOIN pg_namespace n ON n.oid = p.pronamespace \
                     WHERE n.nspname = {} AND p.proname = {} LIMIT 1",
                    DIALECT.quote_literal(database),
                    DIALECT.quote_literal(object)
                ))?
                .ok_or_else(missing),
            ObjectKind::Trigger => self
                .scalar(&format!(
                    "SELECT pg_get_triggerdef(t.oid, true) FROM pg_trigger t \
                     JOIN pg_class c ON c.oid = t.tgrelid \
                     JOIN pg_namespace n ON n.oid = c.relnamespace \
                     WHERE NOT t.tgisinternal AND n.nspname = {} AND t.tgname = {} LIMIT 1",
                    DIALECT.quote_literal(database),
                    DIALECT.quote_literal(object)
                ))?
                .ok_or_else(missing),
        }
    }

    fn server_info(&self) -> Result<ServerInfo> {
        let _ctx = ErrorContext::enter("server_info");
        let mut info = ServerInfo::default();
        info.version =
            self.scalar("SELECT current_setting('server_version')")?.unwrap_or_default();
        info.version_comment = self.scalar("SELECT version()")?.unwrap_or_default();
        info.hostname = self
            .scalar("SELECT COALESCE(inet_server_addr()::text, 'local')")?
            .unwrap_or_default();
        info.port = self
            .scalar("SELECT inet_server_port()")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        info.uptime = self
            .scalar(
                "SELECT EXTRACT(EPOCH FROM now() - pg_postmaster_start_time())::bigint",
            )?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        info.threads_connected = self
            .scalar("SELECT COUNT(*) FROM pg_stat_activity")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        info.threads_running = self
            .scalar("SELECT COUNT(*) FROM pg_stat_activity WHERE state = 'active'")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(info)
    }

    fn list_users(&self) -> Result<Vec<UserInfo>> {
        let _ctx = ErrorContext::enter("list_users");
        cached(&self.cache, "users", CacheCategory::Metadata, || {
            let names = self
                .names("SELECT rolname FROM pg_roles WHERE rolcanlogin ORDER BY rolname")?;
            Ok(names
                .into_iter()
                .map(|user| UserInfo { user, ..UserInfo::default() })
                .collect())
        })
    }

    fn global_variables(&self) -> Result<BTreeMap<String, String>> {
        let _ctx = ErrorContext::enter("global_variables");
        self.variables("SELECT name, setting FROM pg_settings ORDER BY name")
    }

    fn session_variables(&self) -> Result<BTreeMap<String, String>> {
        let _ctx = ErrorContext::enter("session_variables");
        // pg_settings reflects the current session; source-level defaults
        // would need pg_file_settings.
        self.variables("SELECT name, setting FROM pg_settings ORDER BY name")
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
            let pk = DIALECT.quote_identifier(&info.primary_key);
            self.names(&format!(
                "SELECT {}::text FROM {} ORDER BY {} LIMIT {} OFFSET {}",
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

impl PgSchemaManager {
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
