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

//! Bounded pool of validated database sessions.
//!
//! `Pool` is generic over a `ConnectionFactory`; each backend supplies its
//! own factory and wraps the pool in the object-safe `ConnectionPool`
//! trait the engine holds. Sessions are validated on acquire and replaced
//! when stale; the RAII guard returns the session unless the pool is
//! draining.

use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::{
    cache::CacheManager,
    config::DataConfig,
    error::{Error, Result},
    path::ParsedPath,
    schema::SchemaManager,
    vfile::{ContentSource, DbVirtualFile},
};

/// Maximum attempts for `with_retry`.
pub const MAX_RETRIES: u32 = 3;

/// A native session the pool can manage.
pub trait ManagedConnection: Send {
    /// Cheap liveness probe run before a pooled session is handed out.
    fn validate(&mut self) -> bool;
}

/// Creates native sessions for one backend.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: ManagedConnection;

    fn connect(&self) -> Result<Self::Connection>;
}

struct PoolState<C> {
    idle: VecDeque<C>,
    created: usize,
    draining: bool,
}

/// Bounded pool with condition-variable waiting and warm start.
pub struct Pool<F: ConnectionFactory> {
    factory: F,
    capacity: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState<F::Connection>>,
    available: Condvar,
    waiting: AtomicUsize,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Build the pool and eagerly open `min(capacity / 2, 3)` sessions so
    /// the first filesystem operations do not pay connection latency.
    /// Fails when warm sessions were requested but not a single one could
    /// be opened; further sessions are created on demand up to `capacity`.
    pub fn new(factory: F, capacity: usize, acquire_timeout: Duration) -> Result<Pool<F>> {
        let pool = Pool {
            factory,
            capacity,
            acquire_timeout,
            state: Mutex::new(PoolState { idle: VecDeque::new(), created: 0, draining: false }),
            available: Condvar::new(),
            waiting: AtomicUsize::new(0),
        };

        let warm = std::cmp::min(capacity / 2, 3);
        let mut first_error = None;
        for _ in 0..warm {
            match pool.factory.connect() {
                Ok(conn) => {
                    let mut state = pool.state.lock();
                    state.idle.push_back(conn);
                    state.created += 1;
                }
                Err(e) => {
                    warn!("pool warm-up connection failed: {}", e);
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            if pool.state.lock().created == 0 {
                return Err(e);
            }
        }
        debug!("pool warmed with {} of {} sessions", pool.state.lock().created, capacity);
        Ok(pool)
    }

    /// Acquire a validated session, blocking up to the pool's configured
    /// timeout.
    pub fn acquire(&self) -> Result<PooledConnection<F>> {
        self.acquire_timeout(self.acquire_timeout)
    }

    /// Acquire a validated session, blocking up to `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<F>> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut state = self.state.lock();
            if state.draining {
                return Err(Error::shutdown());
            }

            if let Some(mut conn) = state.idle.pop_front() {
                drop(state);
                if conn.validate() {
                    return Ok(PooledConnection { conn: Some(conn), pool: self });
                }
                debug!("discarding stale pooled connection");
                self.forget_one();
                continue;
            }

            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                match self.factory.connect() {
                    Ok(conn) => return Ok(PooledConnection { conn: Some(conn), pool: self }),
                    Err(e) => {
                        self.forget_one();
                        return Err(e);
                    }
                }
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(Error::timeout("timed out waiting for a database connection")),
            };
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let timed_out = self.available.wait_for(&mut state, remaining).timed_out();
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            if timed_out {
                return Err(Error::timeout("timed out waiting for a database connection"));
            }
        }
    }

    /// Non-blocking acquire.
    pub fn try_acquire(&self) -> Option<PooledConnection<F>> {
        loop {
            let mut state = self.state.lock();
            if state.draining {
                return None;
            }
            if let Some(mut conn) = state.idle.pop_front() {
                drop(state);
                if conn.validate() {
                    return Some(PooledConnection { conn: Some(conn), pool: self });
                }
                self.forget_one();
                continue;
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                match self.factory.connect() {
                    Ok(conn) => return Some(PooledConnection { conn: Some(conn), pool: self }),
                    Err(e) => {
                        debug!("try_acquire connect failed: {}", e);
                        self.forget_one();
                        return None;
                    }
                }
            }
            return None;
        }
    }

    pub fn available_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn total_count(&self) -> usize {
        self.state.lock().created
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// True when the pool can hand out a live session right now.
    pub fn health_check(&self) -> bool {
        self.acquire().is_ok()
    }

    /// Reject new acquisitions, wake all waiters, and destroy idle
    /// sessions. In-use sessions are destroyed as their guards drop.
    pub fn drain(&self) {
        let mut state = self.state.lock();
        state.draining = true;
        let dropped = state.idle.len();
        state.created -= dropped;
        state.idle.clear();
        drop(state);
        self.available.notify_all();
        debug!("pool drained, {} idle sessions destroyed", dropped);
    }

    fn release(&self, conn: F::Connection) {
        let mut state = self.state.lock();
        if state.draining {
            state.created -= 1;
            drop(state);
            self.available.notify_all();
            return;
        }
        state.idle.push_back(conn);
        drop(state);
        self.available.notify_one();
    }

    /// A session was destroyed outside the idle queue; free its slot.
    fn forget_one(&self) {
        let mut state = self.state.lock();
        state.created = state.created.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

/// Scoped ownership of a pooled session. Dropping the guard returns the
/// session to the pool, or destroys it while draining; the inner `Option`
/// rules out a double return.
pub struct PooledConnection<'a, F: ConnectionFactory> {
    conn: Option<F::Connection>,
    pool: &'a Pool<F>,
}

impl<'a, F: ConnectionFactory> std::fmt::Debug for PooledConnection<'a, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish()
    }
}

impl<'a, F: ConnectionFactory> Deref for PooledConnection<'a, F> {
    type Target = F::Connection;

    fn deref(&self) -> &F::Connection {
        self.conn.as_ref().expect("connection is present until drop; qed")
    }
}

impl<'a, F: ConnectionFactory> DerefMut for PooledConnection<'a, F> {
    fn deref_mut(&mut self) -> &mut F::Connection {
        self.conn.as_mut().expect("connection is present until drop; qed")
    }
}

impl<'a, F: ConnectionFactory> Drop for PooledConnection<'a, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Run `operation`, retrying up to `MAX_RETRIES` times on retryable errors
/// (connection lost, lock-wait timeout, deadlock, too many concurrent
/// transactions) with exponential backoff.
pub fn with_retry<T, Op: FnMut() -> Result<T>>(mut operation: Op) -> Result<T> {
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < MAX_RETRIES => {
                attempt += 1;
                let backoff = Duration::from_millis(100u64 << attempt);
                warn!("retryable database error ({}), attempt {} of {}", e, attempt, MAX_RETRIES);
                thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

/// The backend-independent surface of a connection pool: statistics,
/// health, drain, and the factory building virtual files over this
/// backend's `ContentSource`.
pub trait ConnectionPool: Send + Sync {
    fn available_count(&self) -> usize;
    fn total_count(&self) -> usize;
    fn waiting_count(&self) -> usize;
    fn health_check(&self) -> bool;
    fn drain(&self);

    /// The SQL executor virtual files and the engine run statements
    /// through.
    fn source(&self) -> Arc<dyn ContentSource>;

    /// Build a virtual file for `path` backed by this pool.
    fn create_virtual_file(
        &self,
        path: ParsedPath,
        schema: Arc<dyn SchemaManager>,
        cache: Arc<CacheManager>,
        config: DataConfig,
    ) -> DbVirtualFile {
        DbVirtualFile::new(path, self.source(), schema, cache, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct TestConnection {
        born_epoch: usize,
        epoch: Arc<AtomicUsize>,
    }

    impl ManagedConnection for TestConnection {
        fn validate(&mut self) -> bool {
            // A session is stale once the factory epoch has moved on.
            self.born_epoch == self.epoch.load(Ordering::SeqCst)
        }
    }

    struct TestFactory {
        connects: Arc<AtomicUsize>,
        epoch: Arc<AtomicUsize>,
    }

    impl TestFactory {
        fn new() -> TestFactory {
            TestFactory {
                connects: Arc::new(AtomicUsize::new(0)),
                epoch: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ConnectionFactory for TestFactory {
        type Connection = TestConnection;

        fn connect(&self) -> Result<TestConnection> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(TestConnection {
                born_epoch: self.epoch.load(Ordering::SeqCst),
                epoch: self.epoch.clone(),
            })
        }
    }

    #[test]
    fn warm_start_and_bounds() {
        let pool = Pool::new(TestFactory::new(), 10, Duration::from_millis(100)).unwrap();
        assert_eq!(pool.total_count(), 3);
        assert_eq!(pool.available_count(), 3);

        let mut held = Vec::new();
        for _ in 0..10 {
            held.push(pool.acquire().unwrap());
        }
        assert_eq!(pool.total_count(), 10);
        assert_eq!(pool.available_count(), 0);
        drop(held);
        assert_eq!(pool.available_count(), 10);
        assert_eq!(pool.total_count(), 10);
    }

    #[test]
    fn acquire_times_out_when_exhausted() {
        let pool = Pool::new(TestFactory::new(), 1, Duration::from_millis(50)).unwrap();
        let held = pool.acquire().unwrap();
        let started = Instant::now();
        let err = pool.acquire().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(held);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn try_acquire_does_not_block() {
        let pool = Pool::new(TestFactory::new(), 1, Duration::from_millis(50)).unwrap();
        let held = pool.try_acquire();
        assert!(held.is_some());
        assert!(pool.try_acquire().is_none());
        drop(held);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn stale_connections_are_replaced() {
        let factory = TestFactory::new();
        let connects = factory.connects.clone();
        let epoch = factory.epoch.clone();
        let pool = Pool::new(factory, 4, Duration::from_millis(100)).unwrap();
        let warmed = connects.load(Ordering::SeqCst);

        // Every warm session is now stale; acquire must discard them all
        // and hand out a freshly connected one.
        epoch.fetch_add(1, Ordering::SeqCst);
        let conn = pool.acquire().unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), warmed + 1);
        drop(conn);
        assert_eq!(pool.total_count(), 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn drain_rejects_and_destroys() {
        let pool = Pool::new(TestFactory::new(), 4, Duration::from_millis(50)).unwrap();
        let held = pool.acquire().unwrap();
        pool.drain();
        let err = pool.acquire().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shutdown);
        // The in-use session is destroyed on drop, not re-queued.
        drop(held);
        assert_eq!(pool.available_count(), 0);
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn retry_helper_retries_only_retryable() {
        let mut calls = 0;
        let result: Result<u32> = with_retry(|| {
            calls += 1;
            if calls < 3 {
                Err(Error::retryable(ErrorKind::Timeout, "deadlock"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<u32> = with_retry(|| {
            calls += 1;
            Err(Error::invalid("syntax"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
