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

//! Oracle backend. Databases map to schemas (owners), catalog data comes
//! from the `ALL_*` views, DDL from `DBMS_METADATA.GET_DDL`, and `ROWID`
//! addresses rows in tables without a primary key.

mod pool;
mod schema;
mod source;

pub use self::pool::{OracleFactory, OraclePool, OracleSession};
pub use self::schema::OracleSchemaManager;
pub use self::source::OracleSource;

use std::sync::Arc;

use ::oracle::{sql_type::OracleType, Connection};

use crate::{
    cache::CacheManager,
    config::Config,
    error::{Error, ErrorKind, Result},
    format::{ColumnHint, Dialect, SqlValue},
    pool::{ConnectionPool, Pool},
    schema::SchemaManager,
};

pub(crate) const DIALECT: Dialect = Dialect::DOUBLE_QUOTE;

pub(crate) const SYSTEM_DATABASES: &[&str] = &[
    "SYS",
    "SYSTEM",
    "OUTLN",
    "DIP",
    "ORACLE_OCM",
    "DBSNMP",
    "APPQOSSYS",
    "WMSYS",
    "EXFSYS",
    "CTXSYS",
    "XDB",
    "ANONYMOUS",
    "MDSYS",
    "OLAPSYS",
    "ORDDATA",
    "ORDSYS",
    "SI_INFORMTN_SCHEMA",
    "LBACSYS",
    "GSMADMIN_INTERNAL",
    "OJVMSYS",
    "AUDSYS",
];

/// Build the pool pair for an Oracle instance.
pub fn init(
    config: &Config,
    cache: Arc<CacheManager>,
) -> Result<(Arc<dyn ConnectionPool>, Arc<dyn SchemaManager>)> {
    let factory = OracleFactory::new(&config.connection)?;
    let pool = Arc::new(Pool::new(
        factory,
        config.performance.connection_pool_size,
        config.connection.connect_timeout(),
    )?);
    let source = Arc::new(OracleSource::new(pool.clone(), config.data.clone()));
    let facade = Arc::new(OraclePool::new(pool.clone(), source));
    let schema = Arc::new(OracleSchemaManager::new(pool, cache, facade.clone()));
    Ok((facade, schema))
}

/// `ROWID` is a pseudocolumn and must not be quoted as an identifier.
pub(crate) fn key_expr(pk_column: &str) -> String {
    if pk_column == "ROWID" {
        pk_column.to_string()
    } else {
        DIALECT.quote_identifier(pk_column)
    }
}

/// Map a driver error into the taxonomy via its ORA code.
pub(crate) fn map_err(e: ::oracle::Error) -> Error {
    let db_error = match &e {
        ::oracle::Error::OciError(db) | ::oracle::Error::DpiError(db) => db,
        other => return Error::io(other.to_string()),
    };
    let message = db_error.message().to_string();
    match db_error.code().abs() {
        // End-of-file on channel, not connected, connection lost.
        3113 | 3114 | 3135 => Error::retryable(ErrorKind::NotFound, message),
        // TNS connect failures.
        12170 | 12541 | 12543 => Error::new(ErrorKind::NotFound, message),
        // Invalid credentials, insufficient privileges, locked account.
        1017 | 1031 | 1045 | 28000 | 28001 => Error::access_denied(message),
        // Object does not exist, no data found, missing trigger.
        942 | 1403 | 4043 | 4080 | 4098 => Error::not_found(message),
        // Unique constraint, name already used, second primary key.
        1 | 955 | 2260 => Error::exists(message),
        // Invalid SQL, identifiers, numbers, oversized values.
        900 | 903 | 904 | 911 | 917 | 923 | 936 | 1722 | 1756 | 12899 => {
            Error::invalid(message)
        }
        // Referential integrity.
        2291 | 2292 => Error::invalid(message),
        // Resource busy, deadlocks, lock timeouts.
        54 | 60 | 4020 | 4021 => Error::retryable(ErrorKind::Timeout, message),
        // Read-only database.
        16000 => Error::new(ErrorKind::ReadOnly, message),
        // Tablespace and extent exhaustion.
        1536 | 1653 | 1654 => Error::new(ErrorKind::NoSpace, message),
        // Archiver stuck.
        257 => Error::new(ErrorKind::Busy, message),
        _ => Error::io(message),
    }
}

fn hint_for(column_type: &OracleType) -> ColumnHint {
    let numeric = matches!(
        column_type,
        OracleType::Number(_, _)
            | OracleType::Float(_)
            | OracleType::BinaryFloat
            | OracleType::BinaryDouble
            | OracleType::Int64
            | OracleType::UInt64
    );
    ColumnHint { numeric, boolean: matches!(column_type, OracleType::Boolean) }
}

/// Run a query and collect column names, typing hints and stringified
/// rows.
pub(crate) fn query_rows(
    conn: &Connection,
    sql: &str,
) -> Result<(Vec<String>, Vec<ColumnHint>, Vec<Vec<SqlValue>>)> {
    let result = conn.query(sql, &[]).map_err(map_err)?;
    let (names, hints) = {
        let columns = result.column_info();
        (
            columns.iter().map(|c| c.name().to_string()).collect::<Vec<String>>(),
            columns.iter().map(|c| hint_for(c.oracle_type())).collect::<Vec<ColumnHint>>(),
        )
    };

    let mut rows = Vec::new();
    for row_result in result {
        let row = row_result.map_err(map_err)?;
        let mut values = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            values.push(row.get::<usize, Option<String>>(i).map_err(map_err)?);
        }
        rows.push(values);
    }
    Ok((names, hints, rows))
}

/// Run a statement and report affected rows.
pub(crate) fn exec(conn: &Connection, sql: &str) -> Result<u64> {
    let statement = conn.execute(sql, &[]).map_err(map_err)?;
    statement.row_count().map_err(map_err)
}
