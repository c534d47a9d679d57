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

//! Schema manager over `sqlite_master` and the PRAGMA tables.

use std::{collections::BTreeMap, sync::Arc};

use super::{collect_rows, map_err, SqliteFactory, SqlitePool, DIALECT};
use crate::{
    cache::{CacheCategory, CacheManager},
    error::{Error, ErrorContext, Result},
    pool::{with_retry, ConnectionPool, Pool},
    schema::{
        cached, ColumnInfo, IndexInfo, ObjectKind, RoutineInfo, RoutineKind, SchemaManager,
        ServerInfo, TableInfo, TriggerInfo, UserInfo, ViewInfo,
    },
};

pub struct SqliteSchemaManager {
    pool: Arc<Pool<SqliteFactory>>,
    cache: Arc<CacheManager>,
    facade: Arc<SqlitePool>,
}

impl SqliteSchemaManager {
    pub fn new(
        pool: Arc<Pool<SqliteFactory>>,
        cache: Arc<CacheManager>,
        facade: Arc<SqlitePool>,
    ) -> SqliteSchemaManager {
        SqliteSchemaManager { pool, cache, facade }
    }

    /// Names from `sqlite_master` for one object type.
    fn master_names(&self, database: &str, object_type: &str) -> Result<Vec<String>> {
        with_retry(|| {
            let conn = self.pool.acquire()?;
            let sql = format!(
                "SELECT name FROM {}.sqlite_master WHERE type = {} \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
                DIALECT.quote_identifier(database),
                DIALECT.quote_literal(object_type)
            );
            let mut stmt = conn.prepare(&sql).map_err(map_err)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_err)?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(map_err)?;
            Ok(names)
        })
    }

    fn master_sql(&self, database: &str, object_type: &str, name: &str) -> Result<Option<String>> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT sql FROM {}.sqlite_master WHERE type = {} AND name = {}",
            DIALECT.quote_identifier(database),
            DIALECT.quote_literal(object_type),
            DIALECT.quote_literal(name)
        );
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let mut rows = stmt.query([]).map_err(map_err)?;
        match rows.next().map_err(map_err)? {
            Some(row) => Ok(row.get::<_, Option<String>>(0).map_err(map_err)?),
            None => Ok(None),
        }
    }

    fn count_rows(&self, database: &str, table: &str) -> Result<u64> {
        let conn = self.pool.acquire()?;
        let sql = format!("SELECT COUNT(*) FROM {}", DIALECT.qualified(Some(database), table));
        conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(map_err)
    }
}

impl SchemaManager for SqliteSchemaManager {
    fn list_databases(&self) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_databases");
        cached(&self.cache, "databases", CacheCategory::Schema, || {
            with_retry(|| {
                // `main` plus any attached schemas. The session-scoped
                // `temp` schema is never exposed as a database.
                let mut names = vec!["main".to_string()];
                let conn = self.pool.acquire()?;
                let mut stmt = conn.prepare("PRAGMA database_list").map_err(map_err)?;
                let attached = stmt
                    .query_map([], |row| row.get::<_, String>(1))
                    .map_err(map_err)?
                    .collect::<rusqlite::Result<Vec<String>>>()
                    .map_err(map_err)?;
                names.extend(
                    attached.into_iter().filter(|name| name != "main" && name != "temp"),
                );
                Ok(names)
            })
        })
    }

    fn database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.list_databases()?.iter().any(|db| db == database))
    }

    fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_tables");
        cached(&self.cache, &format!("{}/tables", database), CacheCategory::Schema, || {
            self.master_names(database, "table")
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
            let primary_key = columns
                .iter()
                .find(|c| c.key == "PRI")
                .map(|c| c.name.clone())
                // Every rowid table addresses rows by rowid when no
                // explicit primary key exists.
                .unwrap_or_else(|| "rowid".to_string());
            let rows_estimate = self.count_rows(database, table)?;
            Ok(Some(TableInfo {
                name: table.to_string(),
                database: database.to_string(),
                engine: "sqlite".to_string(),
                rows_estimate,
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
            let conn = self.pool.acquire()?;
            let sql = format!(
                "PRAGMA {}.table_info({})",
                DIALECT.quote_identifier(database),
                DIALECT.quote_identifier(table)
            );
            let (_, _, rows) = collect_rows(&conn, &sql)?;
            let mut columns = Vec::with_capacity(rows.len());
            for row in rows {
                // cid, name, type, notnull, dflt_value, pk
                let cell = |i: usize| row.get(i).cloned().flatten();
                let type_name = cell(2).unwrap_or_default();
                let pk_ordinal =
                    cell(5).and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
                columns.push(ColumnInfo {
                    name: cell(1).unwrap_or_default(),
                    type_name: type_name.clone(),
                    full_type: type_name,
                    nullable: cell(3).as_deref() == Some("0"),
                    default_value: cell(4),
                    key: if pk_ordinal > 0 { "PRI".to_string() } else { String::new() },
                    ordinal: cell(0).and_then(|v| v.parse().ok()).unwrap_or(0),
                    ..ColumnInfo::default()
                });
            }
            Ok(columns)
        })
    }

    fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<IndexInfo>> {
        let _ctx = ErrorContext::enter("list_indexes");
        let key = format!("{}/tables/{}/indexes", database, table);
        cached(&self.cache, &key, CacheCategory::Metadata, || {
            let conn = self.pool.acquire()?;
            let list_sql = format!(
                "PRAGMA {}.index_list({})",
                DIALECT.quote_identifier(database),
                DIALECT.quote_identifier(table)
            );
            let (_, _, index_rows) = collect_rows(&conn, &list_sql)?;
            let mut indexes = Vec::new();
            for row in index_rows {
                // seq, name, unique, origin, partial
                let cell = |i: usize| row.get(i).cloned().flatten();
                let name = match cell(1) {
                    Some(name) => name,
                    None => continue,
                };
                let info_sql = format!(
                    "PRAGMA {}.index_info({})",
                    DIALECT.quote_identifier(database),
                    DIALECT.quote_identifier(&name)
                );
                let (_, _, column_rows) = collect_rows(&conn, &info_sql)?;
                let columns = column_rows
                    .into_iter()
                    .filter_map(|r| r.get(2).cloned().flatten())
                    .collect();
                indexes.push(IndexInfo {
                    name,
                    unique: cell(2).as_deref() == Some("1"),
                    primary: cell(3).as_deref() == Some("pk"),
                    columns,
                    index_type: "BTREE".to_string(),
                    ..IndexInfo::default()
                });
            }
            Ok(indexes)
        })
    }

    fn list_views(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_views");
        cached(&self.cache, &format!("{}/views", database), CacheCategory::Schema, || {
            self.master_names(database, "view")
        })
    }

    fn describe_view(&self, database: &str, view: &str) -> Result<Option<ViewInfo>> {
        if !self.list_views(database)?.iter().any(|v| v == view) {
            return Ok(None);
        }
        Ok(Some(ViewInfo {
            name: view.to_string(),
            database: database.to_string(),
            ..ViewInfo::default()
        }))
    }

    fn list_procedures(&self, _database: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn list_functions(&self, _database: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn describe_routine(
        &self,
        _database: &str,
        _name: &str,
        _kind: RoutineKind,
    ) -> Result<Option<RoutineInfo>> {
        Ok(None)
    }

    fn list_triggers(&self, database: &str) -> Result<Vec<String>> {
        let _ctx = ErrorContext::enter("list_triggers");
        cached(&self.cache, &format!("{}/triggers", database), CacheCategory::Schema, || {
            self.master_names(database, "trigger")
        })
    }

    fn describe_trigger(&self, database: &str, trigger: &str) -> Result<Option<TriggerInfo>> {
        let _ctx = ErrorContext::enter("describe_trigger");
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT tbl_name, sql FROM {}.sqlite_master WHERE type = 'trigger' AND name = {}",
            DIALECT.quote_identifier(database),
            DIALECT.quote_literal(trigger)
        );
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let mut rows = stmt.query([]).map_err(map_err)?;
        let row = match rows.next().map_err(map_err)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let table: String = row.get(0).map_err(map_err)?;
        let statement: Option<String> = row.get(1).map_err(map_err)?;
        let statement = statement.unwrap_or_default();
        let upper = statement.to_uppercase();
        let timing = ["BEFORE", "AFTER", "INSTEAD OF"]
            .iter()
            .find(|t| upper.contains(*t))
            .map(|t| t.to_string())
            .unwrap_or_default();
        let event = ["INSERT", "UPDATE", "DELETE"]
            .iter()
            .find(|e| upper.contains(*e))
            .map(|e| e.to_string())
            .unwrap_or_default();
        Ok(Some(TriggerInfo {
            name: trigger.to_string(),
            database: database.to_string(),
            table,
            event,
            timing,
            statement,
            ..TriggerInfo::default()
        }))
    }

    fn create_statement(&self, database: &str, object: &str, kind: ObjectKind) -> Result<String> {
        let _ctx = ErrorContext::enter("create_statement");
        let object_type = match kind {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Procedure | ObjectKind::Function => {
                return Err(Error::not_found("SQLite has no stored routines"));
            }
        };
        match self.master_sql(database, object_type, object)? {
            Some(sql) => Ok(sql),
            None => Err(Error::not_found(format!(
                "{} {}.{} not found",
                kind.as_str(),
                database,
                object
            ))),
        }
    }

    fn server_info(&self) -> Result<ServerInfo> {
        let _ctx = ErrorContext::enter("server_info");
        let conn = self.pool.acquire()?;
        let version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(map_err)?;
        let file: String = conn
            .query_row(
                "SELECT file FROM pragma_database_list WHERE name = 'main'",
                [],
                |row| row.get(0),
            )
            .unwrap_or_default();
        Ok(ServerInfo {
            version,
            version_comment: "SQLite".to_string(),
            hostname: file,
            ..ServerInfo::default()
        })
    }

    fn list_users(&self) -> Result<Vec<UserInfo>> {
        Ok(Vec::new())
    }

    fn global_variables(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    fn session_variables(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
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
            let conn = self.pool.acquire()?;
            let pk = DIALECT.quote_identifier(&info.primary_key);
            let sql = format!(
                "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
                pk,
                DIALECT.qualified(Some(database), table),
                pk,
                limit,
                offset
            );
            let (_, _, rows) = collect_rows(&conn, &sql)?;
            Ok(rows.into_iter().filter_map(|r| r.into_iter().next().flatten()).collect())
        })
    }

    fn row_count(&self, database: &str, table: &str) -> Result<u64> {
        let _ctx = ErrorContext::enter("row_count");
        let key = format!("{}/tables/{}/rowcount", database, table);
        cached(&self.cache, &key, CacheCategory::Data, || self.count_rows(database, table))
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
        &[]
    }

    fn connection_pool(&self) -> Arc<dyn ConnectionPool> {
        self.facade.clone()
    }
}
