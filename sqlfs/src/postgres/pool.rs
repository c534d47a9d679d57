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
    sync::Arc,
    time::Duration,
};

use ::postgres::{Client, Config as PgConfig, NoTls};

use super::{map_err, PgSource};
use crate::{
    config::ConnectionConfig,
    error::Result,
    pool::{ConnectionFactory, ConnectionPool, ManagedConnection, Pool},
    vfile::ContentSource,
};

pub struct PgSession {
    client: Client,
}

impl Deref for PgSession {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl DerefMut for PgSession {
    fn deref_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl ManagedConnection for PgSession {
    fn validate(&mut self) -> bool {
        self.client.is_valid(Duration::from_secs(2)).is_ok()
    }
}

/// Assembles a libpq-style config and opens sessions.
pub struct PgFactory {
    config: PgConfig,
}

impl PgFactory {
    pub fn new(config: &ConnectionConfig) -> PgFactory {
        let mut pg = PgConfig::new();
        pg.host(if config.socket.is_empty() { &config.host } else { &config.socket });
        pg.port(config.port);
        pg.user(&config.user);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        pg.dbname(if config.database.is_empty() { "postgres" } else { &config.database });
        pg.connect_timeout(config.connect_timeout());
        PgFactory { config: pg }
    }
}

impl ConnectionFactory for PgFactory {
    type Connection = PgSession;

    fn connect(&self) -> Result<PgSession> {
        let client = self.config.connect(NoTls).map_err(map_err)?;
        Ok(PgSession { client })
    }
}

/// The engine-facing pool surface for PostgreSQL.
pub struct PgPool {
    pool: Arc<Pool<PgFactory>>,
    source: Arc<PgSource>,
}

impl PgPool {
    pub fn new(pool: Arc<Pool<PgFactory>>, source: Arc<PgSource>) -> PgPool {
        PgPool { pool, source }
    }
}

impl ConnectionPool for PgPool {
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
