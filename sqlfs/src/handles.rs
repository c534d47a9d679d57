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

//! Open-handle table: numeric handles to live virtual files.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::vfile::DbVirtualFile;

/// Maps `u64` handles to open virtual files. Handle ids are monotonically
/// increasing and never reused within a process lifetime.
pub struct HandleTable {
    files: Mutex<HashMap<u64, Arc<DbVirtualFile>>>,
    next_handle: AtomicU64,
}

impl HandleTable {
    pub fn new() -> HandleTable {
        HandleTable { files: Mutex::new(HashMap::new()), next_handle: AtomicU64::new(1) }
    }

    /// Register a freshly constructed virtual file and return its handle.
    pub fn insert(&self, file: DbVirtualFile) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.files.lock().insert(handle, Arc::new(file));
        handle
    }

    /// Look up an open file. The returned reference stays valid past
    /// `release` for callers already holding it.
    pub fn get(&self, handle: u64) -> Option<Arc<DbVirtualFile>> {
        self.files.lock().get(&handle).cloned()
    }

    /// Remove a handle, destroying the virtual file once the last
    /// reference drops.
    pub fn release(&self, handle: u64) -> Option<Arc<DbVirtualFile>> {
        self.files.lock().remove(&handle)
    }

    pub fn open_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl Default for HandleTable {
    fn default() -> HandleTable {
        HandleTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::{
        cache::CacheManager,
        config::{CacheConfig, DataConfig},
        error::Result,
        format::RowData,
        path::{self, FileFormat},
        schema::tests::EmptySchema,
        vfile::ContentSource,
    };

    struct NullSource;

    impl ContentSource for NullSource {
        fn fetch_object(&self, _: &str, _: &str, _: FileFormat) -> Result<String> {
            Ok(String::new())
        }
        fn fetch_row(&self, _: &str, _: &str, _: &str, _: &str, _: FileFormat) -> Result<String> {
            Ok(String::new())
        }
        fn row_exists(&self, _: &str, _: &str, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn database_info(&self, _: &str) -> Result<String> {
            Ok(String::new())
        }
        fn user_info(&self, _: &str) -> Result<String> {
            Ok(String::new())
        }
        fn insert_rows(&self, _: &str, _: &str, _: &[RowData]) -> Result<u64> {
            Ok(0)
        }
        fn update_row(&self, _: &str, _: &str, _: &str, _: &str, _: &RowData) -> Result<u64> {
            Ok(0)
        }
        fn delete_row(&self, _: &str, _: &str, _: &str, _: &str) -> Result<u64> {
            Ok(0)
        }
    }

    fn test_file() -> DbVirtualFile {
        DbVirtualFile::new(
            path::parse("/db/tables/t.csv"),
            Arc::new(NullSource),
            Arc::new(EmptySchema),
            Arc::new(CacheManager::new(CacheConfig::default())),
            DataConfig::default(),
        )
    }

    #[test]
    fn handles_are_unique_and_never_reused() {
        let table = HandleTable::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let handle = table.insert(test_file());
            assert!(seen.insert(handle));
            table.release(handle);
        }
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn get_after_release_fails() {
        let table = HandleTable::new();
        let handle = table.insert(test_file());
        assert!(table.get(handle).is_some());
        assert_eq!(table.open_count(), 1);
        assert!(table.release(handle).is_some());
        assert!(table.get(handle).is_none());
        assert!(table.release(handle).is_none());
    }
}
