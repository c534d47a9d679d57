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

//! Runtime configuration: sectioned config file, defaults, validation.
//!
//! The file keeps the original INI shape — `[connection]`, `[cache]`,
//! `[data]`, `[security]`, `[performance]` sections with `key = value`
//! lines — and is parsed with `toml`. Command-line arguments override
//! file values; the password falls back to `SQLFUSE_PASSWORD`.

use std::{env, fmt, fs, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "SQLFUSE_PASSWORD";

/// Which database backend to mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    Sqlite,
    Postgresql,
    Oracle,
}

impl FromStr for DatabaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<DatabaseType> {
        match s {
            "mysql" | "mariadb" => Ok(DatabaseType::Mysql),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "postgresql" | "postgres" => Ok(DatabaseType::Postgresql),
            "oracle" => Ok(DatabaseType::Oracle),
            other => Err(Error::invalid(format!("unknown database type: {}", other))),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Oracle => "oracle",
        };
        write!(f, "{}", name)
    }
}

/// `[connection]` section. Timeouts are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub socket: String,
    /// Default database, or the database file path for SQLite.
    pub database: String,
    pub use_ssl: bool,
    pub ssl_ca: String,
    pub ssl_cert: String,
    pub ssl_key: String,
    pub connect_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
}

impl Default for ConnectionConfig {
    fn default() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            socket: String::new(),
            database: String::new(),
            use_ssl: false,
            ssl_ca: String::new(),
            ssl_cert: String::new(),
            ssl_key: String::new(),
            connect_timeout: 5_000,
            read_timeout: 30_000,
            write_timeout: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout)
    }
}

/// `[cache]` section. TTLs are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size_bytes: usize,
    pub data_ttl: u64,
    pub schema_ttl: u64,
    pub metadata_ttl: u64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            max_size_bytes: 100 * 1024 * 1024,
            data_ttl: 30,
            schema_ttl: 300,
            metadata_ttl: 60,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl)
    }

    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_ttl)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl)
    }
}

/// `[data]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub max_rows_per_file: usize,
    pub rows_per_page: usize,
    pub pretty_json: bool,
    pub include_csv_header: bool,
    pub default_format: String,
}

impl Default for DataConfig {
    fn default() -> DataConfig {
        DataConfig {
            max_rows_per_file: 10_000,
            rows_per_page: 1_000,
            pretty_json: true,
            include_csv_header: true,
            default_format: "csv".to_string(),
        }
    }
}

/// `[security]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub read_only: bool,
    pub allowed_databases: Vec<String>,
    pub denied_databases: Vec<String>,
    pub expose_system_databases: bool,
}

/// `[performance]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub connection_pool_size: usize,
    pub max_concurrent_queries: usize,
    pub max_fuse_threads: usize,
}

impl Default for PerformanceConfig {
    fn default() -> PerformanceConfig {
        PerformanceConfig {
            connection_pool_size: 10,
            max_concurrent_queries: 20,
            max_fuse_threads: 10,
        }
    }
}

/// The complete configuration record.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub cache: CacheConfig,
    pub data: DataConfig,
    pub security: SecurityConfig,
    pub performance: PerformanceConfig,

    pub mountpoint: String,
    pub database_type: DatabaseType,
    pub foreground: bool,
    pub debug: bool,
    pub allow_other: bool,
    pub allow_root: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            connection: ConnectionConfig::default(),
            cache: CacheConfig::default(),
            data: DataConfig::default(),
            security: SecurityConfig::default(),
            performance: PerformanceConfig::default(),
            mountpoint: String::new(),
            database_type: DatabaseType::Mysql,
            foreground: false,
            debug: false,
            allow_other: false,
            allow_root: false,
        }
    }
}

impl Config {
    /// Load a sectioned config file.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::invalid(format!("cannot read config file {}: {}", path.as_ref().display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            Error::invalid(format!("cannot parse config file {}: {}", path.as_ref().display(), e))
        })
    }

    /// Fill the password from the environment when the config left it empty.
    pub fn resolve_password(&mut self) {
        if self.connection.password.is_empty() {
            if let Ok(password) = env::var(PASSWORD_ENV) {
                self.connection.password = password;
            }
        }
    }

    /// Startup validation; failures map to exit code 1.
    pub fn validate(&self) -> Result<()> {
        if self.mountpoint.is_empty() {
            return Err(Error::invalid("mountpoint is required"));
        }
        let mountpoint = Path::new(&self.mountpoint);
        if !mountpoint.exists() {
            return Err(Error::invalid(format!("mountpoint does not exist: {}", self.mountpoint)));
        }
        if !mountpoint.is_dir() {
            return Err(Error::invalid(format!(
                "mountpoint is not a directory: {}",
                self.mountpoint
            )));
        }
        if self.database_type != DatabaseType::Sqlite && self.connection.user.is_empty() {
            return Err(Error::invalid("database username is required"));
        }
        if self.performance.connection_pool_size == 0 {
            return Err(Error::invalid("connection_pool_size must not be zero"));
        }
        if self.connection.use_ssl {
            for file in [&self.connection.ssl_ca, &self.connection.ssl_cert, &self.connection.ssl_key]
            {
                if !file.is_empty() && !Path::new(file).exists() {
                    return Err(Error::invalid(format!("SSL file not found: {}", file)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 3306);
        assert_eq!(config.cache.max_size_bytes, 100 * 1024 * 1024);
        assert_eq!(config.cache.data_ttl(), Duration::from_secs(30));
        assert_eq!(config.cache.schema_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.metadata_ttl(), Duration::from_secs(60));
        assert!(config.cache.enabled);
        assert_eq!(config.data.max_rows_per_file, 10_000);
        assert_eq!(config.data.rows_per_page, 1_000);
        assert_eq!(config.performance.connection_pool_size, 10);
        assert_eq!(config.performance.max_fuse_threads, 10);
        assert!(!config.security.read_only);
    }

    #[test]
    fn sectioned_file_parses() {
        let text = r#"
mountpoint = "/mnt/sql"
database_type = "sqlite"
foreground = true

[connection]
host = "db.example.com"
port = 3307
user = "reader"
connect_timeout = 2500

[cache]
max_size_bytes = 1048576
data_ttl = 5
enabled = false

[data]
max_rows_per_file = 50
pretty_json = false

[security]
read_only = true
denied_databases = ["secret"]

[performance]
connection_pool_size = 3
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.mountpoint, "/mnt/sql");
        assert_eq!(config.database_type, DatabaseType::Sqlite);
        assert!(config.foreground);
        assert_eq!(config.connection.host, "db.example.com");
        assert_eq!(config.connection.port, 3307);
        assert_eq!(config.connection.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.cache.max_size_bytes, 1_048_576);
        assert!(!config.cache.enabled);
        assert_eq!(config.data.max_rows_per_file, 50);
        assert!(!config.data.pretty_json);
        assert!(config.security.read_only);
        assert_eq!(config.security.denied_databases, vec!["secret".to_string()]);
        assert_eq!(config.performance.connection_pool_size, 3);
        // Unspecified values keep their defaults.
        assert_eq!(config.connection.read_timeout, 30_000);
        assert_eq!(config.data.rows_per_page, 1_000);
    }

    #[test]
    fn database_type_aliases() {
        assert_eq!("mysql".parse::<DatabaseType>().unwrap(), DatabaseType::Mysql);
        assert_eq!("mariadb".parse::<DatabaseType>().unwrap(), DatabaseType::Mysql);
        assert_eq!("sqlite3".parse::<DatabaseType>().unwrap(), DatabaseType::Sqlite);
        assert_eq!("postgres".parse::<DatabaseType>().unwrap(), DatabaseType::Postgresql);
        assert_eq!("oracle".parse::<DatabaseType>().unwrap(), DatabaseType::Oracle);
        assert!("mssql".parse::<DatabaseType>().is_err());
    }
}
