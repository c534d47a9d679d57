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

//! End-to-end engine scenarios against a scratch SQLite database.

#![cfg(feature = "sqlite")]

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use sqlfs::{
    config::Config,
    engine::FilesystemEngine,
    error::ErrorKind,
    init_engine, DatabaseType,
};
use tempfile::TempDir;

struct TestDb {
    _dir: TempDir,
    path: PathBuf,
}

fn seed_database() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shop.db");
    let conn = rusqlite::Connection::open(&path).expect("open scratch database");
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT, qty INTEGER);
         INSERT INTO users (id, name) VALUES (1, 'Ann'), (2, 'Bo,b');
         INSERT INTO orders (id, item, qty) VALUES (10, 'pen', 3);
         CREATE VIEW user_names AS SELECT name FROM users;",
    )
    .expect("seed schema");
    TestDb { _dir: dir, path }
}

fn test_config(path: &Path) -> Config {
    let mut config = Config::default();
    config.database_type = DatabaseType::Sqlite;
    config.connection.host = path.display().to_string();
    config.performance.connection_pool_size = 4;
    config.data.pretty_json = false;
    config
}

fn engine_for(path: &Path) -> FilesystemEngine {
    init_engine(test_config(path)).expect("engine initializes")
}

fn names(entries: Vec<sqlfs::engine::DirEntry>) -> Vec<String> {
    entries.into_iter().map(|e| e.name).collect()
}

fn read_all(engine: &FilesystemEngine, path: &str) -> String {
    let handle = engine.open(path, false).expect("open for read");
    let data = engine.read(handle, 0, 1 << 20).expect("read");
    engine.release(handle);
    String::from_utf8(data).expect("utf-8 content")
}

fn write_all(engine: &FilesystemEngine, path: &str, body: &str) {
    let handle = engine.open(path, true).expect("open for write");
    engine.write(handle, 0, body.as_bytes()).expect("write");
    engine.flush(handle).expect("flush");
    engine.release(handle);
}

#[test]
fn mount_and_list() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let root = names(engine.readdir("/").unwrap());
    assert!(root.contains(&"main".to_string()));
    assert!(root.contains(&".server_info".to_string()));
    assert!(root.contains(&".users".to_string()));
    assert!(root.contains(&".variables".to_string()));
    // The session-scoped temp schema is never listed as a database.
    assert!(!root.contains(&"temp".to_string()));

    let tables = names(engine.readdir("/main/tables").unwrap());
    for expected in [
        "users",
        "users.csv",
        "users.json",
        "users.sql",
        "orders",
        "orders.csv",
        "orders.json",
        "orders.sql",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing {}", expected);
    }

    let table_dir = names(engine.readdir("/main/tables/users").unwrap());
    assert_eq!(table_dir, vec![".schema", ".indexes", ".stats", "rows"]);

    let views = names(engine.readdir("/main/views").unwrap());
    assert!(views.contains(&"user_names.csv".to_string()));
    assert!(views.contains(&"user_names.sql".to_string()));
}

#[test]
fn read_table_csv() {
    let db = seed_database();
    let engine = engine_for(&db.path);
    let content = read_all(&engine, "/main/tables/users.csv");
    assert_eq!(content, "id,name\n1,Ann\n2,\"Bo,b\"\n");
}

#[test]
fn read_table_json_preserves_types() {
    let db = seed_database();
    let engine = engine_for(&db.path);
    let content = read_all(&engine, "/main/tables/orders.json");
    assert_eq!(content, "[{\"id\":10,\"item\":\"pen\",\"qty\":3}]");
}

#[test]
fn read_single_row() {
    let db = seed_database();
    let engine = engine_for(&db.path);
    let content = read_all(&engine, "/main/tables/users/rows/1.json");
    assert_eq!(content.trim_end(), "{\"id\":1,\"name\":\"Ann\"}");
}

#[test]
fn row_insert_through_create() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let handle = engine.create("/main/tables/users/rows/3.json").unwrap();
    engine.write(handle, 0, b"{\"id\":3,\"name\":\"Cy\"}").unwrap();
    engine.release(handle);

    let rows = names(engine.readdir("/main/tables/users/rows").unwrap());
    assert!(rows.contains(&"3.json".to_string()));

    let csv = read_all(&engine, "/main/tables/users.csv");
    assert!(csv.contains("3,Cy"), "csv missing inserted row: {}", csv);
}

#[test]
fn row_upsert_updates_existing() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    write_all(&engine, "/main/tables/users/rows/1.json", "{\"name\":\"Al\"}");

    let content = read_all(&engine, "/main/tables/users/rows/1.json");
    assert_eq!(content.trim_end(), "{\"id\":1,\"name\":\"Al\"}");
    assert_eq!(engine.schema().row_count("main", "users").unwrap(), 2);
}

#[test]
fn row_delete_through_unlink() {
    let db = seed_database();
    let engine = engine_for(&db.path);
    assert_eq!(engine.schema().row_count("main", "users").unwrap(), 2);

    engine.unlink("/main/tables/users/rows/2.json").unwrap();

    let err = engine.getattr("/main/tables/users/rows/2.json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.schema().row_count("main", "users").unwrap(), 1);

    // Deleting it again reports the row as gone.
    let err = engine.unlink("/main/tables/users/rows/2.json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn table_write_inserts_csv_rows() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    write_all(&engine, "/main/tables/orders.csv", "id,item,qty\n11,ink,2\n12,pad,\n");

    let csv = read_all(&engine, "/main/tables/orders.csv");
    assert!(csv.contains("11,ink,2"));
    assert!(csv.contains("12,pad,"));
    assert_eq!(engine.schema().row_count("main", "orders").unwrap(), 3);
}

#[test]
fn table_write_inserts_json_rows() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    write_all(
        &engine,
        "/main/tables/orders.json",
        "[{\"id\": 20, \"item\": \"clip\", \"qty\": 7}]",
    );
    assert_eq!(engine.schema().row_count("main", "orders").unwrap(), 2);
}

#[test]
fn malformed_write_reports_invalid_argument() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let handle = engine.open("/main/tables/orders.json", true).unwrap();
    engine.write(handle, 0, b"this is not json").unwrap();
    let err = engine.flush(handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    engine.release(handle);

    // Nothing was committed.
    assert_eq!(engine.schema().row_count("main", "orders").unwrap(), 1);
}

#[test]
fn cache_invalidated_by_flush() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    // Populate the cache with the current table content.
    let before = read_all(&engine, "/main/tables/users.csv");
    assert!(!before.contains("9,Zed"));

    write_all(&engine, "/main/tables/users/rows/9.json", "{\"id\":9,\"name\":\"Zed\"}");

    let after = read_all(&engine, "/main/tables/users.csv");
    assert!(after.contains("9,Zed"), "stale cache after flush: {}", after);
}

#[test]
fn write_buffer_stays_local_until_flush() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let reader = engine.open("/main/tables/users.csv", false).unwrap();
    let before = engine.read(reader, 0, 1 << 20).unwrap();

    let writer = engine.open("/main/tables/users.csv", true).unwrap();
    engine.write(writer, 0, b"id,name\n7,Gus\n").unwrap();

    // The reader's content is untouched while the write is buffered.
    let during = engine.read(reader, 0, 1 << 20).unwrap();
    assert_eq!(before, during);

    engine.flush(writer).unwrap();
    engine.release(writer);
    engine.release(reader);

    let after = read_all(&engine, "/main/tables/users.csv");
    assert!(after.contains("7,Gus"));
}

#[test]
fn denied_database_is_invisible() {
    let db = seed_database();
    let mut config = test_config(&db.path);
    config.security.denied_databases = vec!["main".to_string()];
    let engine = init_engine(config).unwrap();

    let err = engine.getattr("/main").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let root = names(engine.readdir("/").unwrap());
    assert!(!root.contains(&"main".to_string()));
}

#[test]
fn read_only_enforcement() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    // Read-only variants reject write opens outright.
    let err = engine.open("/main/tables/users/.schema", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);

    // DDL files open for write but refuse the flush.
    let handle = engine.open("/main/tables/users.sql", true).unwrap();
    engine.write(handle, 0, b"DROP TABLE users;").unwrap();
    let err = engine.flush(handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
    engine.release(handle);

    // Globally read-only mounts refuse everything.
    let mut config = test_config(&db.path);
    config.security.read_only = true;
    let engine = init_engine(config).unwrap();
    let err = engine.open("/main/tables/users.csv", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
    let err = engine.unlink("/main/tables/users/rows/1.json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
    let err = engine.create("/main/tables/users/rows/5.json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
}

#[test]
fn create_and_unlink_limited_to_row_files() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let err = engine.create("/main/tables/users.csv").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    let err = engine.unlink("/main/tables/users.csv").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    let err = engine.unlink("/nope/tables/t/rows/1.csv").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn metadata_files_render() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let schema_text = read_all(&engine, "/main/tables/users/.schema");
    assert!(schema_text.contains("id"));
    assert!(schema_text.contains("PRI"));

    let stats = read_all(&engine, "/main/tables/users/.stats");
    assert!(stats.contains("Table: users"));
    assert!(stats.contains("Rows (estimate): 2"));

    let ddl = read_all(&engine, "/main/tables/users.sql");
    assert!(ddl.starts_with("CREATE TABLE"));
    assert!(ddl.trim_end().ends_with(';'));

    let view = read_all(&engine, "/main/views/user_names.csv");
    assert!(view.starts_with("name\n"));

    let info = read_all(&engine, "/main/.info");
    assert!(info.contains("Tables: 2"));

    let server = read_all(&engine, "/.server_info");
    assert!(server.contains("Version:"));
}

#[test]
fn getattr_modes_follow_variants() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    let root = engine.getattr("/").unwrap();
    assert!(root.is_dir);
    assert_eq!(root.perm, 0o755);

    let table = engine.getattr("/main/tables/users.csv").unwrap();
    assert!(!table.is_dir);
    assert_eq!(table.perm, 0o644);

    let schema = engine.getattr("/main/tables/users/.schema").unwrap();
    assert_eq!(schema.perm, 0o444);

    let err = engine.getattr("/main/tables/missing.csv").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = engine.getattr("/missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn pool_acquisition_times_out_under_contention() {
    let db = seed_database();
    let factory = sqlfs::sqlite::SqliteFactory::new(db.path.clone(), Duration::from_secs(1));
    let pool = sqlfs::pool::Pool::new(factory, 1, Duration::from_millis(200)).unwrap();

    let held = pool.acquire().unwrap();
    let started = Instant::now();
    let err = pool.acquire().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
    drop(held);
    assert!(pool.acquire().is_ok());
}

#[test]
fn release_commits_pending_writes() {
    let db = seed_database();
    let engine = engine_for(&db.path);

    // No explicit flush: release must commit on close.
    let handle = engine.open("/main/tables/users/rows/4.json", true).unwrap();
    engine.write(handle, 0, b"{\"id\":4,\"name\":\"Di\"}").unwrap();
    engine.release(handle);

    assert_eq!(engine.schema().row_count("main", "users").unwrap(), 3);
    assert_eq!(engine.open_handles(), 0);
}
