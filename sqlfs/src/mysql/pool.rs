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

use std::{
    ops::{Deref, DerefMut},
    path::PathBuf,
    sync::Arc,
};

use ::mysql::{prelude::Queryable, Conn, Opts, OptsBuilder, SslOpts};

use super::{map_err, MySqlSource};
use crate::{
    config::ConnectionConfig,
    error::Result,
    pool::{ConnectionFactory, ConnectionPool, ManagedConnection, Pool},
    vfile::ContentSource,
};

pub struct MySqlSession {
    conn: Conn,
}

impl Deref for MySqlSession {
    type Target = Conn;

    fn deref(&self) -> &Conn {
        &self.conn
    }
}

impl DerefMut for MySqlSession {
    fn deref_mut(&mut self) -> &mut Conn {
        &mut self.conn
    }
}

impl ManagedConnection for MySqlSession {
    fn validate(&mut self) -> bool {
        self.conn.query_drop("SELECT 1").is_ok()
    }
}

/// Assembles connection options from the config and opens sessions.
pub struct MySqlFactory {
    opts: Opts,
}

impl MySqlFactory {
    pub fn new(config: &ConnectionConfig) -> MySqlFactory {
        let mut builder = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .tcp_connect_timeout(Some(config.connect_timeout()))
            .read_timeout(Some(config.read_timeout()))
            .write_timeout(Some(config.write_timeout()));
        if !config.socket.is_empty() {
            builder = builder.socket(Some(config.socket.clone()));
        }
        if !config.database.is_empty() {
            builder = builder.db_name(Some(config.database.clone()));
        }
        if config.use_ssl {
            let mut ssl = SslOpts::default();
            if !config.ssl_ca.is_empty() {
                ssl = ssl.with_root_cert_path(Some(PathBuf::from(&config.ssl_ca)));
            }
            builder = builder.ssl_opts(Some(ssl));
        }
        MySqlFactory { opts: Opts::from(builder) }
    }
}

impl ConnectionFactory for MySqlFactory {
    type Connection = MySqlSession;

    fn connect(&self) -> Result<MySqlSession> {
        let conn = Conn::new(self.opts.clone()).map_err(map_err)?;
        Ok(MySqlSession { conn })
    }
}

/// The engine-facing pool surface for MySQL.
pub struct MySqlPool {
    pool: Arc<Pool<MySqlFactory>>,
    source: Arc<MySqlSource>,
}

impl MySqlPool {
    pub fn new(pool: Arc<Pool<MySqlFactory>>, source: Arc<MySqlSource>) -> MySqlPool {
        MySqlPool { pool, source }
    }
}

impl ConnectionPool for MySqlPool {
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
