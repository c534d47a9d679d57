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

//! SQLite backend. The connection "host" is the database file path; the
//! single logical database is `main` (plus any attached schemas). There
//! are no stored routines, users or server variables.

mod pool;
mod schema;
mod source;

pub use self::pool::{SqliteFactory, SqlitePool, SqliteSession};
pub use self::schema::SqliteSchemaManager;
pub use self::source::SqliteSource;

use std::{path::PathBuf, sync::Arc};

use rusqlite::types::ValueRef;

use crate::{
    cache::CacheManager,
    config::Config,
    error::{Error, ErrorKind, Result},
    format::{ColumnHint, Dialect, SqlValue},
    pool::{ConnectionPool, Pool},
    schema::SchemaManager,
};

pub(crate) const DIALECT: Dialect = Dialect::DOUBLE_QUOTE;

/// Build the pool pair for a SQLite database file.
pub fn init(
    config: &Config,
    cache: Arc<CacheManager>,
) -> Result<(Arc<dyn ConnectionPool>, Arc<dyn SchemaManager>)> {
    let path = database_path(config)?;
    let factory = SqliteFactory::new(path, config.connection.read_timeout());
    let pool = Arc::new(Pool::new(
        factory,
        config.performance.connection_pool_size,
        config.connection.connect_timeout(),
    )?);
    let source = Arc::new(SqliteSource::new(pool.clone(), config.data.clone()));
    let facade = Arc::new(SqlitePool::new(pool.clone(), source));
    let schema = Arc::new(SqliteSchemaManager::new(pool, cache, facade.clone()));
    Ok((facade, schema))
}

/// The database file: the connection host doubles as the path, with the
/// default database as fallback.
fn database_path(config: &Config) -> Result<PathBuf> {
    let host = &config.connection.host;
    let candidate =
        if !host.is_empty() && host != "localhost" { host } else { &config.connection.database };
    if candidate.is_empty() {
        return Err(Error::invalid("SQLite requires a database file path (host or database)"));
    }
    Ok(PathBuf::from(candidate))
}

/// Map a driver error into the taxonomy. rusqlite folds the generic
/// SQLITE_ERROR result code into one variant, so missing objects and bad
/// SQL are told apart by message.
pub(crate) fn map_err(e: rusqlite::Error) -> Error {
    use rusqlite::ErrorCode;

    match &e {
        rusqlite::Error::SqliteFailure(code, message) => {
            let text = message.clone().unwrap_or_else(|| e.to_string());
            if text.contains("no such table") || text.contains("no such view") {
                return Error::not_found(text);
            }
            if text.contains("syntax error") || text.contains("no such column") {
                return Error::invalid(text);
            }
            match code.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    Error::retryable(ErrorKind::Busy, text)
                }
                ErrorCode::ConstraintViolation => match code.extended_code {
                    // SQLITE_CONSTRAINT_PRIMARYKEY and SQLITE_CONSTRAINT_UNIQUE
                    1555 | 2067 => Error::exists(text),
                    _ => Error::invalid(text),
                },
                ErrorCode::NotADatabase | ErrorCode::CannotOpen => Error::not_found(text),
                ErrorCode::ReadOnly => Error::new(ErrorKind::ReadOnly, text),
                ErrorCode::DiskFull => Error::new(ErrorKind::NoSpace, text),
                ErrorCode::PermissionDenied => Error::access_denied(text),
                _ => Error::io(text),
            }
        }
        rusqlite::Error::QueryReturnedNoRows => Error::not_found("no rows returned"),
        other => Error::io(other.to_string()),
    }
}

/// Run a query and collect column names, typing hints and stringified
/// rows. SQLite types dynamically, so a column counts as numeric only
/// when every value seen in it was numeric.
pub(crate) fn collect_rows(
    conn: &rusqlite::Connection,
    sql: &str,
) -> Result<(Vec<String>, Vec<ColumnHint>, Vec<Vec<SqlValue>>)> {
    let mut stmt = conn.prepare(sql).map_err(map_err)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let count = columns.len();

    let mut hints = vec![ColumnHint { numeric: true, boolean: false }; count];
    let mut seen = vec![false; count];
    let mut out = Vec::new();

    let mut rows = stmt.query([]).map_err(map_err)?;
    while let Some(row) = rows.next().map_err(map_err)? {
        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let value = match row.get_ref(i).map_err(map_err)? {
                ValueRef::Null => None,
                ValueRef::Integer(v) => {
                    seen[i] = true;
                    Some(v.to_string())
                }
                ValueRef::Real(v) => {
                    seen[i] = true;
                    Some(v.to_string())
                }
                ValueRef::Text(v) => {
                    seen[i] = true;
                    hints[i].numeric = false;
                    Some(String::from_utf8_lossy(v).into_owned())
                }
                ValueRef::Blob(v) => {
                    seen[i] = true;
                    hints[i].numeric = false;
                    Some(String::from_utf8_lossy(v).into_owned())
                }
            };
            values.push(value);
        }
        out.push(values);
    }

    for i in 0..count {
        if !seen[i] {
            hints[i].numeric = false;
        }
    }
    Ok((columns, hints, out))
}
