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

//! SQLFuse client: configuration assembly, logging bootstrap and the
//! mount loop.

mod cli;

use std::sync::Arc;

use log::{error, info};
use structopt::StructOpt;

use sqlfs::Config;

pub use crate::cli::CliOptions;

fn init_logging(config: &Config) {
    let default_level = if config.debug { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_millis();
    if !config.foreground {
        // Daemon-style invocations go through the mount supervisor's
        // captured stderr; keep the output plain.
        builder.write_style(env_logger::WriteStyle::Never);
    }
    let _ = builder.try_init();
}

/// Parse arguments, assemble configuration, mount, and run until
/// unmounted. Returns the process exit code: 0 on clean unmount, 1 on
/// configuration or connection failure.
pub fn run() -> i32 {
    let options = CliOptions::from_args();

    let mut config = match &options.config {
        Some(path) => match Config::load_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("sqlfuse: {}", e);
                return 1;
            }
        },
        None => Config::default(),
    };
    if let Err(e) = options.apply(&mut config) {
        eprintln!("sqlfuse: {}", e);
        return 1;
    }
    config.resolve_password();

    init_logging(&config);

    if let Err(e) = config.validate() {
        error!("{}", e);
        return 1;
    }

    info!("starting sqlfuse {}", env!("CARGO_PKG_VERSION"));
    info!(
        "connecting to {} database at {}",
        config.database_type,
        if config.database_type == sqlfs::DatabaseType::Sqlite {
            config.connection.host.clone()
        } else {
            format!("{}:{}", config.connection.host, config.connection.port)
        }
    );

    let engine = match sqlfs::init_engine(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("initialization failed: {}", e);
            return 1;
        }
    };

    info!("mounting at {}", config.mountpoint);
    match sqlfs::fuse::mount(engine, &config) {
        Ok(()) => {
            info!("sqlfuse stopped");
            0
        }
        Err(e) => {
            error!("mount failed: {}", e);
            1
        }
    }
}
