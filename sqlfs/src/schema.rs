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

//! Schema metadata: the immutable records backends populate from their
//! system catalogs, and the `SchemaManager` contract the engine consumes.

use std::{collections::BTreeMap, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    cache::{CacheCategory, CacheManager},
    error::Result,
    pool::ConnectionPool,
};

/// One column of a table or view, in ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Short type name, e.g. `int`.
    pub type_name: String,
    /// Full type with length/precision, e.g. `int(11) unsigned`.
    pub full_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    /// `""`, `"PRI"`, `"UNI"` or `"MUL"`.
    pub key: String,
    pub extra: String,
    pub collation: String,
    pub comment: String,
    pub ordinal: u32,
}

/// One index over a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub primary: bool,
    /// Columns in index order.
    pub columns: Vec<String>,
    pub index_type: String,
    pub comment: String,
    pub cardinality: u64,
}

/// Everything the filesystem reports about one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub database: String,
    pub engine: String,
    pub collation: String,
    pub comment: String,
    pub create_time: String,
    pub update_time: String,
    pub rows_estimate: u64,
    pub data_length: u64,
    pub index_length: u64,
    pub auto_increment: u64,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    /// The column uniquely identifying a row; used for row-file URLs and
    /// update/delete targeting. Empty when the table has no usable key.
    pub primary_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub name: String,
    pub database: String,
    pub definer: String,
    pub security_type: String,
    pub is_updatable: bool,
    pub check_option: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutineInfo {
    pub name: String,
    pub database: String,
    /// `PROCEDURE` or `FUNCTION`.
    pub kind: String,
    pub definer: String,
    /// Return type, for functions.
    pub returns: String,
    pub data_access: String,
    pub security_type: String,
    pub deterministic: bool,
    pub comment: String,
    pub created: String,
    pub modified: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub database: String,
    pub table: String,
    /// `INSERT`, `UPDATE` or `DELETE`.
    pub event: String,
    /// `BEFORE` or `AFTER`.
    pub timing: String,
    pub statement: String,
    pub definer: String,
    pub created: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user: String,
    pub host: String,
    pub account_locked: bool,
    pub password_expired: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub version_comment: String,
    pub hostname: String,
    pub port: u16,
    pub uptime: u64,
    pub threads_connected: u64,
    pub threads_running: u64,
    pub questions: u64,
    pub slow_queries: u64,
}

/// Routine flavour for `describe_routine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
        }
    }
}

/// Object flavour for `create_statement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    View,
    Procedure,
    Function,
    Trigger,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
            ObjectKind::Procedure => "PROCEDURE",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Trigger => "TRIGGER",
        }
    }
}

/// Catalog metadata contract each backend satisfies. All operations are
/// read-only against the database; implementations acquire their own
/// pooled connections and memoize results through the shared cache.
pub trait SchemaManager: Send + Sync {
    fn list_databases(&self) -> Result<Vec<String>>;
    fn database_exists(&self, database: &str) -> Result<bool>;

    fn list_tables(&self, database: &str) -> Result<Vec<String>>;
    fn table_exists(&self, database: &str, table: &str) -> Result<bool>;
    fn describe_table(&self, database: &str, table: &str) -> Result<Option<TableInfo>>;
    fn list_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>>;
    fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<IndexInfo>>;

    fn list_views(&self, database: &str) -> Result<Vec<String>>;
    fn describe_view(&self, database: &str, view: &str) -> Result<Option<ViewInfo>>;

    fn list_procedures(&self, database: &str) -> Result<Vec<String>>;
    fn list_functions(&self, database: &str) -> Result<Vec<String>>;
    fn describe_routine(
        &self,
        database: &str,
        name: &str,
        kind: RoutineKind,
    ) -> Result<Option<RoutineInfo>>;

    fn list_triggers(&self, database: &str) -> Result<Vec<String>>;
    fn describe_trigger(&self, database: &str, trigger: &str) -> Result<Option<TriggerInfo>>;

    /// Backend-native DDL for an object.
    fn create_statement(&self, database: &str, object: &str, kind: ObjectKind) -> Result<String>;

    fn server_info(&self) -> Result<ServerInfo>;
    fn list_users(&self) -> Result<Vec<UserInfo>>;
    fn global_variables(&self) -> Result<BTreeMap<String, String>>;
    fn session_variables(&self) -> Result<BTreeMap<String, String>>;

    /// Ordered primary-key values (or the backend's rowid equivalent when
    /// the table has no primary key).
    fn row_ids(&self, database: &str, table: &str, limit: usize, offset: usize)
        -> Result<Vec<String>>;
    fn row_count(&self, database: &str, table: &str) -> Result<u64>;

    fn invalidate_table(&self, database: &str, table: &str);
    fn invalidate_database(&self, database: &str);
    fn invalidate_all(&self);

    /// The backend's designated system schemas, hidden unless
    /// `expose_system_databases` is set.
    fn system_databases(&self) -> &'static [&'static str];

    fn connection_pool(&self) -> Arc<dyn ConnectionPool>;
}

/// Memoize a catalog result through the cache. Records round-trip as JSON
/// blobs; a blob that fails to decode is treated as a miss and rewritten.
pub(crate) fn cached<T, F>(
    cache: &CacheManager,
    key: &str,
    category: CacheCategory,
    fetch: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if let Some(blob) = cache.get(key) {
        if let Ok(value) = serde_json::from_str(&blob) {
            return Ok(value);
        }
    }
    let value = fetch()?;
    if let Ok(blob) = serde_json::to_string(&value) {
        cache.put_category(key, blob, category);
    }
    Ok(value)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A schema manager over no objects at all; shared by unit tests in
    /// other modules.
    pub struct EmptySchema;

    impl SchemaManager for EmptySchema {
        fn list_databases(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn database_exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn list_tables(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn table_exists(&self, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn describe_table(&self, _: &str, _: &str) -> Result<Option<TableInfo>> {
            Ok(None)
        }
        fn list_columns(&self, _: &str, _: &str) -> Result<Vec<ColumnInfo>> {
            Ok(Vec::new())
        }
        fn list_indexes(&self, _: &str, _: &str) -> Result<Vec<IndexInfo>> {
            Ok(Vec::new())
        }
        fn list_views(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn describe_view(&self, _: &str, _: &str) -> Result<Option<ViewInfo>> {
            Ok(None)
        }
        fn list_procedures(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn list_functions(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn describe_routine(
            &self,
            _: &str,
            _: &str,
            _: RoutineKind,
        ) -> Result<Option<RoutineInfo>> {
            Ok(None)
        }
        fn list_triggers(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn describe_trigger(&self, _: &str, _: &str) -> Result<Option<TriggerInfo>> {
            Ok(None)
        }
        fn create_statement(&self, _: &str, object: &str, _: ObjectKind) -> Result<String> {
            Err(crate::error::Error::not_found(format!("no DDL for {}", object)))
        }
        fn server_info(&self) -> Result<ServerInfo> {
            Ok(ServerInfo::default())
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
        fn row_ids(&self, _: &str, _: &str, _: usize, _: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn row_count(&self, _: &str, _: &str) -> Result<u64> {
            Ok(0)
        }
        fn invalidate_table(&self, _: &str, _: &str) {}
        fn invalidate_database(&self, _: &str) {}
        fn invalidate_all(&self) {}
        fn system_databases(&self) -> &'static [&'static str] {
            &[]
        }
        fn connection_pool(&self) -> Arc<dyn ConnectionPool> {
            unreachable!("EmptySchema has no pool")
        }
    }

    #[test]
    fn cached_fetches_once_until_invalidated() {
        let cache = CacheManager::new(CacheConfig::default());
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["users".to_string(), "orders".to_string()])
        };

        let first: Vec<String> =
            cached(&cache, "shop/tables", CacheCategory::Schema, fetch).unwrap();
        assert_eq!(first, vec!["users", "orders"]);
        let second: Vec<String> = cached(&cache, "shop/tables", CacheCategory::Schema, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        })
        .unwrap();
        assert_eq!(second, vec!["users", "orders"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate_database("shop");
        let third: Vec<String> = cached(&cache, "shop/tables", CacheCategory::Schema, || {
            Ok(vec!["fresh".to_string()])
        })
        .unwrap();
        assert_eq!(third, vec!["fresh"]);
    }

    #[test]
    fn records_round_trip_through_serde() {
        let info = TableInfo {
            name: "users".to_string(),
            database: "shop".to_string(),
            primary_key: "id".to_string(),
            columns: vec![ColumnInfo { name: "id".to_string(), ..ColumnInfo::default() }],
            indexes: vec![IndexInfo { name: "pk".to_string(), ..IndexInfo::default() }],
            ..TableInfo::default()
        };
        let blob = serde_json::to_string(&info).unwrap();
        let back: TableInfo = serde_json::from_str(&blob).unwrap();
        assert_eq!(info, back);
    }
}
