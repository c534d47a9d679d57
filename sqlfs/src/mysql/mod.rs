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

//! MySQL / MariaDB backend: information_schema and `SHOW` catalogs,
//! backtick identifiers, backslash-escaped literals.

mod pool;
mod schema;
mod source;

pub use self::pool::{MySqlFactory, MySqlPool, MySqlSession};
pub use self::schema::MySqlSchemaManager;
pub use self::source::MySqlSource;

use std::sync::Arc;

use ::mysql::{consts::ColumnType, prelude::Queryable, Conn, Value};

use crate::{
    cache::CacheManager,
    config::Config,
    error::{Error, ErrorKind, Result},
    format::{ColumnHint, Dialect, SqlValue},
    pool::{ConnectionPool, Pool},
    schema::SchemaManager,
};

pub(crate) const DIALECT: Dialect = Dialect::BACKTICK;

pub(crate) const SYSTEM_DATABASES: &[&str] =
    &["mysql", "information_schema", "performance_schema", "sys"];

/// Build the pool pair for a MySQL server.
pub fn init(
    config: &Config,
    cache: Arc<CacheManager>,
) -> Result<(Arc<dyn ConnectionPool>, Arc<dyn SchemaManager>)> {
    let factory = MySqlFactory::new(&config.connection);
    let pool = Arc::new(Pool::new(
        factory,
        config.performance.connection_pool_size,
        config.connection.connect_timeout(),
    )?);
    let source = Arc::new(MySqlSource::new(pool.clone(), config.data.clone()));
    let facade = Arc::new(MySqlPool::new(pool.clone(), source));
    let schema = Arc::new(MySqlSchemaManager::new(pool, cache, facade.clone()));
    Ok((facade, schema))
}

/// Map a driver error into the taxonomy, using the server error code
/// where one is present. The retryable set covers lost connections,
/// lock waits, deadlocks and the concurrent-transaction limit.
pub(crate) fn map_err(e: ::mysql::Error) -> Error {
    match &e {
        ::mysql::Error::MySqlError(server) => {
            map_server_code(server.code, server.message.clone())
        }
        ::mysql::Error::IoError(io) => {
            Error::retryable(ErrorKind::NotFound, format!("connection lost: {}", io))
        }
        other => Error::io(other.to_string()),
    }
}

fn map_server_code(code: u16, message: String) -> Error {
    match code {
        // Client-side connection class.
        2002 | 2003 | 2005 => Error::new(ErrorKind::NotFound, message),
        // Server gone / connection lost during query.
        2006 | 2013 | 2055 => Error::retryable(ErrorKind::NotFound, message),
        // Access denied to server, database, table or column.
        1044 | 1045 | 1142 | 1143 | 1227 | 1370 => Error::access_denied(message),
        // Unknown database, table, routine or trigger.
        1049 | 1051 | 1109 | 1146 | 1305 | 1360 => Error::not_found(message),
        // Duplicate database, table, key or entry.
        1007 | 1022 | 1050 | 1062 | 1557 => Error::exists(message),
        // Parse and bad-value class.
        1054 | 1064 | 1136 | 1149 | 1265 | 1292 | 1366 | 1406 => Error::invalid(message),
        // Referential constraints.
        1216 | 1217 | 1451 | 1452 => Error::invalid(message),
        // Lock wait timeout and deadlock.
        1205 | 1213 => Error::retryable(ErrorKind::Timeout, message),
        // Server runs with --read-only or similar.
        1290 | 1836 => Error::new(ErrorKind::ReadOnly, message),
        // Record file full.
        1114 => Error::new(ErrorKind::NoSpace, message),
        // Lock table full; too many concurrent transactions.
        1206 => Error::new(ErrorKind::Busy, message),
        1637 => Error::retryable(ErrorKind::Busy, message),
        _ => Error::io(message),
    }
}

fn hint_for(column_type: ColumnType) -> ColumnHint {
    let numeric = matches!(
        column_type,
        ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_FLOAT
            | ColumnType::MYSQL_TYPE_DOUBLE
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_YEAR
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
    );
    ColumnHint { numeric, boolean: false }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            if *hour == 0 && *minute == 0 && *second == 0 && *micros == 0 {
                format!("{:04}-{:02}-{:02}", year, month, day)
            } else if *micros == 0 {
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                )
            } else {
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, minute, second, micros
                )
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = u32::from(*days) * 24 + u32::from(*hours);
            if *micros == 0 {
                format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds)
            } else {
                format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, total_hours, minutes, seconds, micros
                )
            }
        }
        Value::NULL => String::new(),
    }
}

/// Run a query and collect column names, typing hints and stringified
/// rows.
pub(crate) fn query_rows(
    conn: &mut Conn,
    sql: &str,
) -> Result<(Vec<String>, Vec<ColumnHint>, Vec<Vec<SqlValue>>)> {
    let mut result = conn.query_iter(sql).map_err(map_err)?;
    let (names, hints) = {
        let columns = result.columns();
        let columns = columns.as_ref();
        (
            columns.iter().map(|c| c.name_str().into_owned()).collect::<Vec<String>>(),
            columns.iter().map(|c| hint_for(c.column_type())).collect::<Vec<ColumnHint>>(),
        )
    };

    let mut rows = Vec::new();
    for row in result.by_ref() {
        let row = row.map_err(map_err)?;
        let mut values = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            values.push(match row.as_ref(i) {
                None | Some(Value::NULL) => None,
                Some(value) => Some(value_text(value)),
            });
        }
        rows.push(values);
    }
    Ok((names, hints, rows))
}

/// Run a statement and report affected rows.
pub(crate) fn exec(conn: &mut Conn, sql: &str) -> Result<u64> {
    let result = conn.query_iter(sql).map_err(map_err)?;
    Ok(result.affected_rows())
}
