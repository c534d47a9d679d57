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

use std::{ops::Deref, sync::Arc};

use ::oracle::Connection;

use super::{map_err, OracleSource};
use crate::{
    config::ConnectionConfig,
    error::{Error, Result},
    pool::{ConnectionFactory, ConnectionPool, ManagedConnection, Pool},
    vfile::ContentSource,
};

pub struct OracleSession {
    conn: Connection,
}

impl Deref for OracleSession {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl ManagedConnection for OracleSession {
    fn validate(&mut self) -> bool {
        self.conn.ping().is_ok()
    }
}

/// Opens sessions against `//host:port/service`.
pub struct OracleFactory {
    user: String,
    password: String,
    connect_string: String,
}

impl OracleFactory {
    pub fn new(config: &ConnectionConfig) -> Result<OracleFactory> {
        if config.database.is_empty() {
            return Err(Error::invalid(
                "Oracle requires a service name in connection.database",
            ));
        }
        Ok(OracleFactory {
            user: config.user.clone(),
            password: config.password.clone(),
            connect_string: format!("//{}:{}/{}", config.host, config.port, config.database),
        })
    }
}

impl ConnectionFactory for OracleFactory {
    type Connection = OracleSession;

    fn connect(&self) -> Result<OracleSession> {
        let mut conn = Connection::connect(&self.user, &self.password, &self.connect_string)
            .map_err(map_err)?;
        // Filesystem writes are single statements; commit as they land.
        conn.set_autocommit(true);
        Ok(OracleSession { conn })
    }
}

/// The engine-facing pool surface for Oracle.
pub struct OraclePool {
    pool: Arc<Pool<OracleFactory>>,
    source: Arc<OracleSource>,
}

impl OraclePool {
    pub fn new(pool: Arc<Pool<OracleFactory>>, source: Arc<OracleSource>) -> OraclePool {
        OraclePool { pool, source }
    }
}

impl ConnectionPool for OraclePool {
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
