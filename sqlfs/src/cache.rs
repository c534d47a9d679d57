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

//! Size-bounded, per-entry-TTL, LRU-evicted blob cache with pattern
//! invalidation.
//!
//! The LRU order lives in a `LinkedHashMap`: insertion appends at the
//! most-recently-used back, `get` refreshes to the back, eviction pops the
//! front. The lock is never held across I/O.

use std::time::{Duration, Instant};

use linked_hash_map::LinkedHashMap;
use log::debug;
use parking_lot::RwLock;

use crate::config::CacheConfig;

/// TTL class for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Schema,
    Metadata,
    Data,
}

struct CacheEntry {
    data: String,
    expires: Instant,
    size: usize,
    hits: u64,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub current_size: usize,
    pub max_size: usize,
    pub entry_count: usize,
    pub evictions: u64,
}

struct CacheInner {
    entries: LinkedHashMap<String, CacheEntry>,
    stats: CacheStats,
}

/// Key → blob store shared by the schema manager and virtual files.
pub struct CacheManager {
    config: CacheConfig,
    inner: RwLock<CacheInner>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> CacheManager {
        let stats = CacheStats { max_size: config.max_size_bytes, ..CacheStats::default() };
        CacheManager {
            config,
            inner: RwLock::new(CacheInner { entries: LinkedHashMap::new(), stats }),
        }
    }

    /// Look a key up; refreshes LRU position on hit, lazily removes
    /// expired entries.
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let now = Instant::now();
        let mut inner = self.inner.write();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => now >= entry.expires,
        };

        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.stats.current_size -= entry.size;
            }
            inner.stats.entry_count = inner.entries.len();
            inner.stats.misses += 1;
            return None;
        }

        inner.stats.hits += 1;
        inner.entries.get_refresh(key).map(|entry| {
            entry.hits += 1;
            entry.data.clone()
        })
    }

    /// Store a blob with an explicit TTL. Oversized blobs (more than half
    /// the cache budget) are not cached at all, so a single item can never
    /// flush the whole cache.
    pub fn put(&self, key: &str, data: String, ttl: Duration) {
        if !self.config.enabled {
            return;
        }
        let size = data.len();
        if size > self.config.max_size_bytes / 2 {
            debug!("not caching '{}': {} bytes exceeds half the cache budget", key, size);
            return;
        }

        let mut inner = self.inner.write();
        if let Some(previous) = inner.entries.remove(key) {
            inner.stats.current_size -= previous.size;
        }
        while inner.stats.current_size + size > self.config.max_size_bytes {
            match inner.entries.pop_front() {
                Some((_, evicted)) => {
                    inner.stats.current_size -= evicted.size;
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }

        let entry = CacheEntry { data, expires: Instant::now() + ttl, size, hits: 0 };
        inner.entries.insert(key.to_string(), entry);
        inner.stats.current_size += size;
        inner.stats.entry_count = inner.entries.len();

        debug!("cached '{}' ({} bytes, ttl {:?})", key, size, ttl);
    }

    /// Store a blob with the configured TTL for its category.
    pub fn put_category(&self, key: &str, data: String, category: CacheCategory) {
        let ttl = match category {
            CacheCategory::Schema => self.config.schema_ttl(),
            CacheCategory::Metadata => self.config.metadata_ttl(),
            CacheCategory::Data => self.config.data_ttl(),
        };
        self.put(key, data, ttl);
    }

    /// Presence check without LRU reordering.
    pub fn contains(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let inner = self.inner.read();
        match inner.entries.get(key) {
            Some(entry) => Instant::now() < entry.expires,
            None => false,
        }
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.entries.remove(key) {
            inner.stats.current_size -= entry.size;
        }
        inner.stats.entry_count = inner.entries.len();
    }

    /// Remove every entry whose key matches `pattern`: a literal, a
    /// `prefix*`, or a `prefix*suffix` with exactly one `*`.
    pub fn invalidate(&self, pattern: &str) {
        let mut inner = self.inner.write();
        let victims: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| matches_pattern(key, pattern))
            .cloned()
            .collect();
        for key in &victims {
            if let Some(entry) = inner.entries.remove(key) {
                inner.stats.current_size -= entry.size;
            }
        }
        inner.stats.entry_count = inner.entries.len();
        if !victims.is_empty() {
            debug!("invalidated {} entries matching '{}'", victims.len(), pattern);
        }
    }

    /// Drop everything derived from one table: its content blobs and its
    /// schema-manager records.
    pub fn invalidate_table(&self, database: &str, table: &str) {
        self.invalidate(&format!("{}/{}/*", database, table));
        self.invalidate(&format!("{}/tables/{}*", database, table));
    }

    /// Drop everything belonging to one database.
    pub fn invalidate_database(&self, database: &str) {
        self.invalidate(&format!("{}/*", database));
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.stats.current_size = 0;
        inner.stats.entry_count = 0;
        debug!("cache cleared");
    }

    /// Remove all expired entries eagerly.
    pub fn prune_expired(&self) {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now >= entry.expires)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.stats.current_size -= entry.size;
            }
        }
        inner.stats.entry_count = inner.entries.len();
        if !expired.is_empty() {
            debug!("pruned {} expired entries", expired.len());
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.read().stats
    }
}

/// Wildcard matching with at most one `*`. Without a `*` the pattern is a
/// literal. The length check keeps `a*a` from matching the single
/// character `a`.
fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => key == pattern,
        Some(star) => {
            let prefix = &pattern[..star];
            let suffix = &pattern[star + 1..];
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn small_cache(max_size_bytes: usize) -> CacheManager {
        CacheManager::new(CacheConfig { max_size_bytes, ..CacheConfig::default() })
    }

    fn blob(len: usize) -> String {
        "x".repeat(len)
    }

    #[test]
    fn get_put_and_stats() {
        let cache = small_cache(1024);
        assert_eq!(cache.get("k"), None);
        cache.put("k", "value".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("value".to_string()));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.current_size, 5);
    }

    #[test]
    fn size_stays_bounded() {
        let cache = small_cache(100);
        for i in 0..50 {
            cache.put(&format!("k{}", i), blob(10), Duration::from_secs(60));
            assert!(cache.stats().current_size <= 100);
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        // Three 10-byte slots.
        let cache = small_cache(30);
        cache.put("a", blob(10), Duration::from_secs(60));
        cache.put("b", blob(10), Duration::from_secs(60));
        cache.put("c", blob(10), Duration::from_secs(60));
        assert!(cache.get("a").is_some());
        cache.put("d", blob(10), Duration::from_secs(60));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
    }

    #[test]
    fn replacement_frees_previous_entry() {
        let cache = small_cache(100);
        cache.put("k", blob(40), Duration::from_secs(60));
        cache.put("k", blob(10), Duration::from_secs(60));
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.current_size, 10);
    }

    #[test]
    fn oversized_blob_is_rejected() {
        let cache = small_cache(100);
        cache.put("big", blob(51), Duration::from_secs(60));
        assert!(!cache.contains("big"));
        cache.put("fits", blob(50), Duration::from_secs(60));
        assert!(cache.contains("fits"));
    }

    #[test]
    fn ttl_expiry_counts_a_miss() {
        let cache = small_cache(1024);
        cache.put("k", "v".to_string(), Duration::from_millis(20));
        assert!(cache.contains("k"));
        thread::sleep(Duration::from_millis(40));
        let misses_before = cache.stats().misses;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().misses, misses_before + 1);
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn pattern_invalidation() {
        let cache = small_cache(1024);
        cache.put("a/1", blob(1), Duration::from_secs(60));
        cache.put("a/2", blob(1), Duration::from_secs(60));
        cache.put("b/1", blob(1), Duration::from_secs(60));
        cache.invalidate("a/*");
        assert!(!cache.contains("a/1"));
        assert!(!cache.contains("a/2"));
        assert!(cache.contains("b/1"));
    }

    #[test]
    fn middle_wildcard_and_literal_patterns() {
        let cache = small_cache(1024);
        cache.put("db/users/csv", blob(1), Duration::from_secs(60));
        cache.put("db/users/json", blob(1), Duration::from_secs(60));
        cache.put("db/orders/csv", blob(1), Duration::from_secs(60));
        cache.invalidate("db/*csv");
        assert!(!cache.contains("db/users/csv"));
        assert!(!cache.contains("db/orders/csv"));
        assert!(cache.contains("db/users/json"));
        cache.invalidate("db/users/json");
        assert!(!cache.contains("db/users/json"));
    }

    #[test]
    fn invalidate_table_covers_content_and_schema_keys() {
        let cache = small_cache(4096);
        cache.put("shop/users/csv", blob(1), Duration::from_secs(60));
        cache.put("shop/users/json/rows/1", blob(1), Duration::from_secs(60));
        cache.put("shop/tables/users/columns", blob(1), Duration::from_secs(60));
        cache.put("shop/tables", blob(1), Duration::from_secs(60));
        cache.put("shop/orders/csv", blob(1), Duration::from_secs(60));
        cache.invalidate_table("shop", "users");
        assert!(!cache.contains("shop/users/csv"));
        assert!(!cache.contains("shop/users/json/rows/1"));
        assert!(!cache.contains("shop/tables/users/columns"));
        assert!(cache.contains("shop/tables"));
        assert!(cache.contains("shop/orders/csv"));
        cache.invalidate_database("shop");
        assert!(!cache.contains("shop/tables"));
        assert!(!cache.contains("shop/orders/csv"));
    }

    #[test]
    fn contains_agrees_with_get() {
        let cache = small_cache(1024);
        cache.put("k", blob(3), Duration::from_secs(60));
        for key in ["k", "missing"] {
            assert_eq!(cache.contains(key), cache.get(key).is_some());
        }
    }

    #[test]
    fn disabled_cache_is_inert() {
        let cache = CacheManager::new(CacheConfig { enabled: false, ..CacheConfig::default() });
        cache.put("k", blob(3), Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.contains("k"));
    }

    #[test]
    fn prune_and_clear() {
        let cache = small_cache(1024);
        cache.put("short", blob(1), Duration::from_millis(10));
        cache.put("long", blob(1), Duration::from_secs(60));
        thread::sleep(Duration::from_millis(30));
        cache.prune_expired();
        assert_eq!(cache.stats().entry_count, 1);
        cache.clear();
        assert_eq!(cache.stats().entry_count, 0);
        assert_eq!(cache.stats().current_size, 0);
    }
}
