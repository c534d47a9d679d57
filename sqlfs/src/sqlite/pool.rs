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

use std::{ops::Deref, path::PathBuf, sync::Arc, time::Duration};

use rusqlite::{Connection, OpenFlags};

use super::{map_err, SqliteSource};
use crate::{
    error::Result,
    pool::{ConnectionFactory, ConnectionPool, ManagedConnection, Pool},
    vfile::ContentSource,
};

/// One open database handle. `busy_timeout` stands in for a server-side
/// lock wait.
pub struct SqliteSession {
    conn: Connection,
}

impl Deref for SqliteSession {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl ManagedConnection for SqliteSession {
    fn validate(&mut self) -> bool {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

/// Opens handles onto one database file. The file must already exist;
/// mounting is never allowed to create a database.
pub struct SqliteFactory {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteFactory {
    pub fn new(path: PathBuf, busy_timeout: Duration) -> SqliteFactory {
        SqliteFactory { path, busy_timeout }
    }
}

impl ConnectionFactory for SqliteFactory {
    type Connection = SqliteSession;

    fn connect(&self) -> Result<SqliteSession> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(map_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(map_err)?;
        Ok(SqliteSession { conn })
    }
}

/// The engine-facing pool surface for SQLite.
pub struct SqlitePool {
    pool: Arc<Pool<SqliteFactory>>,
    source: Arc<SqliteSource>,
}

impl SqlitePool {
    pub fn new(pool: Arc<Pool<SqliteFactory>>, source: Arc<SqliteSource>) -> SqlitePool {
        SqlitePool { pool, source }
    }
}

impl ConnectionPool for SqlitePool {
    fn available_count(&self) -> usize {
        self.pool.available_count()
    }

    fn total_count(&self) -> usize {
        self.pool.total_count()
    }

    fn waiting_count(&self) -> usize {
        self.pool.waiting_count()
    }

    fn health_check(&self) -> bool {
        self.pool.health_check()
    }

    fn drain(&self) {
        self.pool.drain()
    }

    fn source(&self) -> Arc<dyn ContentSource> {
        self.source.clone()
    }
}
