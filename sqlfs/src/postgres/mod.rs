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

//! PostgreSQL backend.
//!
//! One connection cannot query across PostgreSQL databases, so the
//! filesystem's database level maps to the schemas (namespaces) of the
//! connected database. Double-quoted identifiers, doubled-quote literals,
//! `ctid` as the row id of last resort.

mod pool;
mod schema;
mod source;

pub use self::pool::{PgFactory, PgPool, PgSession};
pub use self::schema::PgSchemaManager;
pub use self::source::PgSource;

use std::sync::Arc;

use ::postgres::{types::Type, SimpleQueryMessage};

use crate::{
    cache::CacheManager,
    config::Config,
    error::{Error, ErrorKind, Result},
    format::{ColumnHint, Dialect, SqlValue},
    pool::{ConnectionPool, Pool},
    schema::SchemaManager,
};

pub(crate) const DIALECT: Dialect = Dialect::DOUBLE_QUOTE;

pub(crate) const SYSTEM_DATABASES: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// Build the pool pair for a PostgreSQL server.
pub fn init(
    config: &Config,
    cache: Arc<CacheManager>,
) -> Result<(Arc<dyn ConnectionPool>, Arc<dyn SchemaManager>)> {
    let factory = PgFactory::new(&config.connection);
    let pool = Arc::new(Pool::new(
        factory,
        config.performance.connection_pool_size,
        config.connection.connect_timeout(),
    )?);
    let source = Arc::new(PgSource::new(pool.clone(), config.data.clone()));
    let facade = Arc::new(PgPool::new(pool.clone(), source));
    let schema = Arc::new(PgSchemaManager::new(pool, cache, facade.clone()));
    Ok((facade, schema))
}

/// Map a driver error into the taxonomy via its SQLSTATE.
pub(crate) fn map_err(e: ::postgres::Error) -> Error {
    if e.is_closed() {
        return Error::retryable(ErrorKind::NotFound, format!("connection lost: {}", e));
    }
    let db = match e.as_db_error() {
        Some(db) => db,
        None => return Error::io(e.to_string()),
    };
    let message = db.message().to_string();
    match db.code().code() {
        // Authentication and privilege failures.
        "28000" | "28P01" | "42501" => Error::access_denied(message),
        // Unknown database, schema, table or function.
        "3D000" | "3F000" | "42P01" | "42883" => Error::not_found(message),
        // Duplicate object or unique violation.
        "23505" | "42P04" | "42P06" | "42P07" => Error::exists(message),
        // Syntax, bad column, bad text representation, constraint class.
        "42601" | "42703" | "22001" | "22P02" | "23502" | "23503" | "23514" => {
            Error::invalid(message)
        }
        // Serialization failure and deadlock.
        "40001" | "40P01" => Error::retryable(ErrorKind::Timeout, message),
        // Lock not available.
        "55P03" => Error::new(ErrorKind::Busy, message),
        // Too many connections.
        "53300" => Error::retryable(ErrorKind::Busy, message),
        // Disk full / out of memory.
        "53100" | "53200" => Error::new(ErrorKind::NoSpace, message),
        // Read-only transaction.
        "25006" => Error::new(ErrorKind::ReadOnly, message),
        _ => Error::io(message),
    }
}

pub(crate) fn hint_for(column_type: &Type) -> ColumnHint {
    let numeric = matches!(
        *column_type,
        Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8 | Type::NUMERIC
            | Type::OID
    );
    ColumnHint { numeric, boolean: *column_type == Type::BOOL }
}

/// Run a query and collect column names, typing hints and stringified
/// rows. A prepare supplies names and types even for empty result sets;
/// the data itself travels through the text-mode simple-query protocol.
pub(crate) fn query_rows(
    client: &mut ::postgres::Client,
    sql: &str,
) -> Result<(Vec<String>, Vec<ColumnHint>, Vec<Vec<SqlValue>>)> {
    let statement = client.prepare(sql).map_err(map_err)?;
    let names: Vec<String> =
        statement.columns().iter().map(|c| c.name().to_string()).collect();
    let hints: Vec<ColumnHint> =
        statement.columns().iter().map(|c| hint_for(c.type_())).collect();

    let mut rows = Vec::new();
    for message in client.simple_query(sql).map_err(map_err)? {
        if let SimpleQueryMessage::Row(row) = message {
            let mut values = Vec::with_capacity(names.len());
            for i in 0..row.len() {
                values.push(row.get(i).map(str::to_string));
            }
            rows.push(values);
        }
    }
    Ok((names, hints, rows))
}

/// Run a statement and report affected rows.
pub(crate) fn exec(client: &mut ::postgres::Client, sql: &str) -> Result<u64> {
    client.execute(sql, &[]).map_err(map_err)
}
