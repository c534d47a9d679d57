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

//! The filesystem engine: dispatches path-based operations across the
//! router, schema manager, cache, pool and handle table. Operations
//! return taxonomy errors; the kernel adapter turns them into errnos.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::{
    cache::CacheManager,
    config::Config,
    error::{Error, ErrorContext, Result},
    handles::HandleTable,
    path::{self, ParsedPath},
    pool::ConnectionPool,
    schema::SchemaManager,
};

/// Attributes reported by `getattr`. Sizes of regular files are a
/// placeholder; real sizes resolve when content is generated on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub is_dir: bool,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
}

/// One directory entry from `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntry {
    fn dir<N: Into<String>>(name: N) -> DirEntry {
        DirEntry { name: name.into(), is_dir: true }
    }

    fn file<N: Into<String>>(name: N) -> DirEntry {
        DirEntry { name: name.into(), is_dir: false }
    }
}

/// Fixed `statfs` report.
#[derive(Debug, Clone, Copy)]
pub struct FsStatistics {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub frsize: u32,
    pub namemax: u32,
}

impl Default for FsStatistics {
    fn default() -> FsStatistics {
        FsStatistics {
            blocks: 1_000_000,
            bfree: 500_000,
            bavail: 500_000,
            files: 100_000,
            ffree: 50_000,
            bsize: 4096,
            frsize: 4096,
            namemax: 255,
        }
    }
}

const PLACEHOLDER_SIZE: u64 = 4096;

/// The engine owning every shared subsystem. `Sync`; the kernel adapter
/// may call into it from any worker thread.
pub struct FilesystemEngine {
    config: Config,
    cache: Arc<CacheManager>,
    schema: Arc<dyn SchemaManager>,
    pool: Arc<dyn ConnectionPool>,
    handles: HandleTable,
}

impl FilesystemEngine {
    pub fn new(
        config: Config,
        pool: Arc<dyn ConnectionPool>,
        schema: Arc<dyn SchemaManager>,
        cache: Arc<CacheManager>,
    ) -> FilesystemEngine {
        FilesystemEngine { config, cache, schema, pool, handles: HandleTable::new() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn schema(&self) -> &Arc<dyn SchemaManager> {
        &self.schema
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    pub fn open_handles(&self) -> usize {
        self.handles.open_count()
    }

    /// Drain the pool; called once when the filesystem unmounts.
    pub fn shutdown(&self) {
        debug!("engine shutdown, {} handles still open", self.handles.open_count());
        self.pool.drain();
    }

    /// A database is visible iff it passes the deny-list, the allow-list
    /// (when configured) and the system-schema filter.
    fn database_allowed(&self, database: &str) -> bool {
        let security = &self.config.security;
        if security.denied_databases.iter().any(|d| d == database) {
            return false;
        }
        if !security.allowed_databases.is_empty() {
            return security.allowed_databases.iter().any(|d| d == database);
        }
        if !security.expose_system_databases
            && self.schema.system_databases().iter().any(|d| *d == database)
        {
            return false;
        }
        true
    }

    fn check_access(&self, parsed: &ParsedPath) -> Result<()> {
        if let Some(database) = parsed.database() {
            if !self.database_allowed(database) {
                return Err(Error::not_found(format!("database {} is not visible", database)));
            }
        }
        Ok(())
    }

    pub fn getattr(&self, path: &str) -> Result<FileAttributes> {
        let _ctx = ErrorContext::enter("getattr");
        debug!("getattr: {}", path);

        let parsed = path::parse(path);
        if parsed == ParsedPath::NotFound {
            return Err(Error::not_found(path));
        }
        self.check_access(&parsed)?;

        match &parsed {
            ParsedPath::Database { database } => {
                if !self.schema.database_exists(database)? {
                    return Err(Error::not_found(path));
                }
            }
            ParsedPath::TableFile { database, table, .. }
            | ParsedPath::TableDir { database, table }
            | ParsedPath::TableSchema { database, table }
            | ParsedPath::TableIndexes { database, table }
            | ParsedPath::TableStats { database, table }
            | ParsedPath::TableRowsDir { database, table } => {
                if !self.schema.table_exists(database, table)? {
                    return Err(Error::not_found(path));
                }
            }
            ParsedPath::TableRowFile { database, table, row_id, .. } => {
                let info = self
                    .schema
                    .describe_table(database, table)?
                    .ok_or_else(|| Error::not_found(path))?;
                if info.primary_key.is_empty() {
                    return Err(Error::not_found(path));
                }
                if !self.pool.source().row_exists(database, table, &info.primary_key, row_id)? {
                    return Err(Error::not_found(path));
                }
            }
            _ => {}
        }

        Ok(self.attributes_for(&parsed))
    }

    fn attributes_for(&self, parsed: &ParsedPath) -> FileAttributes {
        if parsed.is_directory() {
            FileAttributes { is_dir: true, perm: 0o755, nlink: 2, size: 0 }
        } else {
            let read_only = parsed.is_read_only() || self.config.security.read_only;
            FileAttributes {
                is_dir: false,
                perm: if read_only { 0o444 } else { 0o644 },
                nlink: 1,
                size: PLACEHOLDER_SIZE,
            }
        }
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let _ctx = ErrorContext::enter("readdir");
        debug!("readdir: {}", path);

        let parsed = path::parse(path);
        self.check_access(&parsed)?;

        match &parsed {
            ParsedPath::Root => self.list_root(),
            ParsedPath::Database { .. } => Ok(vec![
                DirEntry::dir("tables"),
                DirEntry::dir("views"),
                DirEntry::dir("procedures"),
                DirEntry::dir("functions"),
                DirEntry::dir("triggers"),
                DirEntry::file(".info"),
            ]),
            ParsedPath::TablesDir { database } => {
                let _ctx = ErrorContext::enter("tables");
                let mut entries = Vec::new();
                for table in self.schema.list_tables(database)? {
                    entries.push(DirEntry::dir(table.clone()));
                    entries.push(DirEntry::file(format!("{}.csv", table)));
                    entries.push(DirEntry::file(format!("{}.json", table)));
                    entries.push(DirEntry::file(format!("{}.sql", table)));
                }
                Ok(entries)
            }
            ParsedPath::TableDir { .. } => Ok(vec![
                DirEntry::file(".schema"),
                DirEntry::file(".indexes"),
                DirEntry::file(".stats"),
                DirEntry::dir("rows"),
            ]),
            ParsedPath::TableRowsDir { database, table } => {
                let _ctx = ErrorContext::enter("rows");
                let ids =
                    self.schema.row_ids(database, table, self.config.data.rows_per_page, 0)?;
                Ok(ids
                    .into_iter()
                    .map(|id| DirEntry::file(format!("{}.json", id)))
                    .collect())
            }
            ParsedPath::ViewsDir { database } => {
                let _ctx = ErrorContext::enter("views");
                let mut entries = Vec::new();
                for view in self.schema.list_views(database)? {
                    entries.push(DirEntry::file(format!("{}.csv", view)));
                    entries.push(DirEntry::file(format!("{}.json", view)));
                    entries.push(DirEntry::file(format!("{}.sql", view)));
                }
                Ok(entries)
            }
            ParsedPath::ProceduresDir { database } => {
                let _ctx = ErrorContext::enter("procedures");
                Ok(sql_leaves(self.schema.list_procedures(database)?))
            }
            ParsedPath::FunctionsDir { database } => {
                let _ctx = ErrorContext::enter("functions");
                Ok(sql_leaves(self.schema.list_functions(database)?))
            }
            ParsedPath::TriggersDir { database } => {
                let _ctx = ErrorContext::enter("triggers");
                Ok(sql_leaves(self.schema.list_triggers(database)?))
            }
            ParsedPath::UsersDir => {
                let _ctx = ErrorContext::enter("users");
                Ok(self
                    .schema
                    .list_users()?
                    .into_iter()
                    .map(|u| DirEntry::file(format!("{}@{}.info", u.user, u.host)))
                    .collect())
            }
            ParsedPath::VariablesDir => {
                Ok(vec![DirEntry::dir("global"), DirEntry::dir("session")])
            }
            ParsedPath::GlobalVariablesDir => {
                let _ctx = ErrorContext::enter("global_variables");
                Ok(self.schema.global_variables()?.into_keys().map(DirEntry::file).collect())
            }
            ParsedPath::SessionVariablesDir => {
                let _ctx = ErrorContext::enter("session_variables");
                Ok(self.schema.session_variables()?.into_keys().map(DirEntry::file).collect())
            }
            ParsedPath::NotFound => Err(Error::not_found(path)),
            _ => Err(Error::not_directory()),
        }
    }

    fn list_root(&self) -> Result<Vec<DirEntry>> {
        let _ctx = ErrorContext::enter("list_databases");
        let mut entries: Vec<DirEntry> = self
            .schema
            .list_databases()?
            .into_iter()
            .filter(|db| self.database_allowed(db))
            .map(DirEntry::dir)
            .collect();
        entries.push(DirEntry::file(".server_info"));
        entries.push(DirEntry::dir(".users"));
        entries.push(DirEntry::dir(".variables"));
        Ok(entries)
    }

    /// Open a path, allocating a handle. `write` reflects the caller's
    /// access mode.
    pub fn open(&self, path: &str, write: bool) -> Result<u64> {
        let _ctx = ErrorContext::enter("open");
        debug!("open: {} (write: {})", path, write);

        let parsed = path::parse(path);
        if parsed == ParsedPath::NotFound {
            return Err(Error::not_found(path));
        }
        self.check_access(&parsed)?;
        if parsed.is_directory() {
            return Err(Error::is_directory());
        }
        if write && (self.config.security.read_only || parsed.is_read_only()) {
            return Err(Error::read_only());
        }

        let file = self.pool.create_virtual_file(
            parsed,
            self.schema.clone(),
            self.cache.clone(),
            self.config.data.clone(),
        );
        Ok(self.handles.insert(file))
    }

    /// Create a new row file. Only `rows/{id}.json` paths can be created.
    pub fn create(&self, path: &str) -> Result<u64> {
        let _ctx = ErrorContext::enter("create");
        debug!("create: {}", path);

        if self.config.security.read_only {
            return Err(Error::read_only());
        }
        let parsed = path::parse(path);
        self.check_access(&parsed)?;
        match parsed {
            ParsedPath::TableRowFile { .. } => {
                let file = self.pool.create_virtual_file(
                    parsed,
                    self.schema.clone(),
                    self.cache.clone(),
                    self.config.data.clone(),
                );
                Ok(self.handles.insert(file))
            }
            ParsedPath::NotFound => Err(Error::not_found(path)),
            _ => Err(Error::access_denied("only row files can be created")),
        }
    }

    pub fn read(&self, handle: u64, offset: u64, size: usize) -> Result<Vec<u8>> {
        let _ctx = ErrorContext::enter("read");
        let file = self.handles.get(handle).ok_or_else(|| Error::bad_handle(handle))?;
        let content = file.content()?;
        let bytes = content.as_bytes();
        let offset = offset as usize;
        if offset >= bytes.len() {
            return Ok(Vec::new());
        }
        let end = std::cmp::min(offset + size, bytes.len());
        Ok(bytes[offset..end].to_vec())
    }

    pub fn write(&self, handle: u64, offset: u64, data: &[u8]) -> Result<usize> {
        let _ctx = ErrorContext::enter("write");
        if self.config.security.read_only {
            return Err(Error::read_only());
        }
        let file = self.handles.get(handle).ok_or_else(|| Error::bad_handle(handle))?;
        file.write(offset, data)
    }

    /// Truncate through an open handle, or accept a handle-less truncate
    /// to zero (the effect is deferred to the following writes).
    pub fn truncate(&self, path: &str, size: u64, handle: Option<u64>) -> Result<()> {
        let _ctx = ErrorContext::enter("truncate");
        debug!("truncate: {} (size: {})", path, size);

        if self.config.security.read_only {
            return Err(Error::read_only());
        }
        if let Some(handle) = handle {
            if let Some(file) = self.handles.get(handle) {
                return file.truncate(size);
            }
        }
        if size == 0 {
            return Ok(());
        }
        Err(Error::access_denied("cannot resize a virtual file without an open handle"))
    }

    /// Delete a row file: `DELETE … WHERE pk = id`, then invalidate the
    /// table's cache entries.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let _ctx = ErrorContext::enter("unlink");
        debug!("unlink: {}", path);

        if self.config.security.read_only {
            return Err(Error::read_only());
        }
        let parsed = path::parse(path);
        self.check_access(&parsed)?;
        let (database, table, row_id) = match &parsed {
            ParsedPath::TableRowFile { database, table, row_id, .. } => {
                (database, table, row_id)
            }
            ParsedPath::NotFound => return Err(Error::not_found(path)),
            _ => return Err(Error::access_denied("only row files can be deleted")),
        };

        let info = self
            .schema
            .describe_table(database, table)?
            .ok_or_else(|| Error::not_found(path))?;
        if info.primary_key.is_empty() {
            return Err(Error::invalid(format!("table {}.{} has no primary key", database, table)));
        }

        let affected = self.pool.source().delete_row(database, table, &info.primary_key, row_id)?;
        if affected == 0 {
            return Err(Error::not_found(path));
        }
        self.cache.invalidate_table(database, table);
        Ok(())
    }

    /// Commit buffered writes on an open handle.
    pub fn flush(&self, handle: u64) -> Result<()> {
        let _ctx = ErrorContext::enter("flush");
        let file = self.handles.get(handle).ok_or_else(|| Error::bad_handle(handle))?;
        file.flush()
    }

    /// Flush pending writes and destroy the handle. Always succeeds to
    /// satisfy POSIX close semantics; flush failures are logged.
    pub fn release(&self, handle: u64) {
        let _ctx = ErrorContext::enter("release");
        if let Some(file) = self.handles.get(handle) {
            if file.is_modified() {
                if let Err(e) = file.flush() {
                    error!(
                        "failed to flush writes on release ({}): {} [{}]",
                        handle,
                        e,
                        ErrorContext::current()
                    );
                }
            }
        } else {
            warn!("release of unknown handle {}", handle);
        }
        self.handles.release(handle);
    }

    pub fn statfs(&self) -> FsStatistics {
        FsStatistics::default()
    }
}

fn sql_leaves(names: Vec<String>) -> Vec<DirEntry> {
    names.into_iter().map(|name| DirEntry::file(format!("{}.sql", name))).collect()
}
