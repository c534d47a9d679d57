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

//! Virtual filesystem engine exposing SQL databases as files.
//!
//! Databases, tables, views, routines and individual rows appear as
//! directories and files whose content is generated on demand in CSV,
//! JSON or DDL form. Writes to table files insert rows, writes to row
//! files insert-or-update, and unlinking a row file deletes the row.
//!
//! The pieces: a pure path router ([`path`]), the format converter
//! ([`format`]), a TTL+LRU cache with pattern invalidation ([`cache`]),
//! a validated connection pool ([`pool`]), the schema-manager contract
//! ([`schema`]), virtual files ([`vfile`]), the open-handle table
//! ([`handles`]), and the engine tying them together ([`engine`]) behind
//! the kernel adapter ([`fuse`]). Backends live in feature-gated
//! submodules.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod fuse;
pub mod handles;
pub mod path;
pub mod pool;
pub mod schema;
pub mod vfile;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "oracle")]
pub mod oracle;
#[cfg(feature = "postgresql")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use log::info;

pub use crate::{
    config::{Config, DatabaseType},
    engine::FilesystemEngine,
    error::{Error, ErrorKind, Result},
};

/// Construct the engine for the configured backend: cache, connection
/// pool and schema manager, followed by a connectivity check.
pub fn init_engine(config: Config) -> Result<FilesystemEngine> {
    let cache = Arc::new(cache::CacheManager::new(config.cache.clone()));

    info!("database type: {}", config.database_type);
    let (pool, schema) = match config.database_type {
        #[cfg(feature = "mysql")]
        DatabaseType::Mysql => mysql::init(&config, cache.clone())?,
        #[cfg(not(feature = "mysql"))]
        DatabaseType::Mysql => {
            return Err(Error::invalid("MySQL support is not compiled in"));
        }

        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => sqlite::init(&config, cache.clone())?,
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::Sqlite => {
            return Err(Error::invalid("SQLite support is not compiled in"));
        }

        #[cfg(feature = "postgresql")]
        DatabaseType::Postgresql => postgres::init(&config, cache.clone())?,
        #[cfg(not(feature = "postgresql"))]
        DatabaseType::Postgresql => {
            return Err(Error::invalid("PostgreSQL support is not compiled in"));
        }

        #[cfg(feature = "oracle")]
        DatabaseType::Oracle => oracle::init(&config, cache.clone())?,
        #[cfg(not(feature = "oracle"))]
        DatabaseType::Oracle => {
            return Err(Error::invalid("Oracle support is not compiled in"));
        }
    };

    if !pool.health_check() {
        return Err(Error::io("database connection health check failed"));
    }
    info!("connected, pool holds {} sessions", pool.total_count());

    Ok(FilesystemEngine::new(config, pool, schema, cache))
}
