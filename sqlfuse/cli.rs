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

//! Command-line surface. Arguments override config-file values.

use std::path::PathBuf;

use sqlfs::Config;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "sqlfuse", about = "Mount SQL databases as a filesystem")]
pub struct CliOptions {
    /// Database type: mysql, sqlite, postgresql, oracle
    #[structopt(short = "t", long = "type")]
    pub database_type: Option<String>,

    /// Database server host (for SQLite: path to the database file)
    #[structopt(short = "H", long)]
    pub host: Option<String>,

    /// Database server port
    #[structopt(short = "P", long)]
    pub port: Option<u16>,

    /// Database username
    #[structopt(short = "u", long)]
    pub user: Option<String>,

    /// Database password (or use SQLFUSE_PASSWORD)
    #[structopt(short = "p", long)]
    pub password: Option<String>,

    /// Unix socket path
    #[structopt(short = "S", long)]
    pub socket: Option<String>,

    /// Default database (for SQLite: path to the database file)
    #[structopt(short = "D", long)]
    pub database: Option<String>,

    /// Enable SSL
    #[structopt(long)]
    pub ssl: bool,

    /// SSL CA certificate file
    #[structopt(long = "ssl-ca")]
    pub ssl_ca: Option<String>,

    /// SSL client certificate file
    #[structopt(long = "ssl-cert")]
    pub ssl_cert: Option<String>,

    /// SSL client key file
    #[structopt(long = "ssl-key")]
    pub ssl_key: Option<String>,

    /// Maximum cache size in MiB
    #[structopt(long = "cache-size")]
    pub cache_size: Option<usize>,

    /// Data cache TTL in seconds
    #[structopt(long = "cache-ttl")]
    pub cache_ttl: Option<u64>,

    /// Disable caching entirely
    #[structopt(long = "no-cache")]
    pub no_cache: bool,

    /// Maximum rows materialized into table files
    #[structopt(long = "max-rows")]
    pub max_rows: Option<usize>,

    /// Mount read-only
    #[structopt(long = "read-only")]
    pub read_only: bool,

    /// Comma-separated list of databases to expose
    #[structopt(long)]
    pub databases: Option<String>,

    /// Stay in the foreground and log to the console
    #[structopt(short = "f", long)]
    pub foreground: bool,

    /// Enable debug output
    #[structopt(short = "d", long)]
    pub debug: bool,

    /// Allow other users to access the mount
    #[structopt(long = "allow-other")]
    pub allow_other: bool,

    /// Allow root to access the mount
    #[structopt(long = "allow-root")]
    pub allow_root: bool,

    /// Maximum filesystem worker threads
    #[structopt(long = "max-threads")]
    pub max_threads: Option<usize>,

    /// Path to a configuration file
    #[structopt(short = "c", long = "config")]
    pub config: Option<PathBuf>,

    /// Mount point directory
    pub mountpoint: Option<String>,
}

impl CliOptions {
    /// Overlay every explicitly given argument onto `config`.
    pub fn apply(&self, config: &mut Config) -> Result<(), sqlfs::Error> {
        if let Some(database_type) = &self.database_type {
            config.database_type = database_type.parse()?;
        }
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(user) = &self.user {
            config.connection.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.connection.password = password.clone();
        }
        if let Some(socket) = &self.socket {
            config.connection.socket = socket.clone();
        }
        if let Some(database) = &self.database {
            config.connection.database = database.clone();
        }
        if self.ssl {
            config.connection.use_ssl = true;
        }
        if let Some(ssl_ca) = &self.ssl_ca {
            config.connection.ssl_ca = ssl_ca.clone();
        }
        if let Some(ssl_cert) = &self.ssl_cert {
            config.connection.ssl_cert = ssl_cert.clone();
        }
        if let Some(ssl_key) = &self.ssl_key {
            config.connection.ssl_key = ssl_key.clone();
        }
        if let Some(cache_size) = self.cache_size {
            config.cache.max_size_bytes = cache_size * 1024 * 1024;
        }
        if let Some(cache_ttl) = self.cache_ttl {
            config.cache.data_ttl = cache_ttl;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(max_rows) = self.max_rows {
            config.data.max_rows_per_file = max_rows;
        }
        if self.read_only {
            config.security.read_only = true;
        }
        if let Some(databases) = &self.databases {
            config.security.allowed_databases = databases
                .split(',')
                .map(|db| db.trim().to_string())
                .filter(|db| !db.is_empty())
                .collect();
        }
        if self.foreground {
            config.foreground = true;
        }
        if self.debug {
            config.debug = true;
        }
        if self.allow_other {
            config.allow_other = true;
        }
        if self.allow_root {
            config.allow_root = true;
        }
        if let Some(max_threads) = self.max_threads {
            config.performance.max_fuse_threads = max_threads;
        }
        if let Some(mountpoint) = &self.mountpoint {
            config.mountpoint = mountpoint.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_override_file_values() {
        let options = CliOptions::from_iter(vec![
            "sqlfuse",
            "-t",
            "sqlite",
            "-H",
            "/data/app.db",
            "--read-only",
            "--cache-size",
            "8",
            "--databases",
            "main, extra",
            "/mnt/sql",
        ]);
        let mut config = Config::default();
        config.connection.host = "ignored".to_string();
        options.apply(&mut config).unwrap();
        assert_eq!(config.database_type, sqlfs::DatabaseType::Sqlite);
        assert_eq!(config.connection.host, "/data/app.db");
        assert!(config.security.read_only);
        assert_eq!(config.cache.max_size_bytes, 8 * 1024 * 1024);
        assert_eq!(config.security.allowed_databases, vec!["main", "extra"]);
        assert_eq!(config.mountpoint, "/mnt/sql");
    }

    #[test]
    fn unset_arguments_leave_config_alone() {
        let options = CliOptions::from_iter(vec!["sqlfuse", "/mnt/sql"]);
        let mut config = Config::default();
        config.connection.host = "db.internal".to_string();
        config.connection.port = 3307;
        options.apply(&mut config).unwrap();
        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 3307);
        assert!(config.cache.enabled);
    }
}
