use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use rusqlite::OpenFlags;

use crate::error::SqlwError;

/// The single engine handle shared by every query of a [`Database`](crate::Database).
///
/// The handle is not safe for concurrent use, so it only leaves the mutex
/// through a [`ConnectionGuard`]. Closing happens on drop.
pub struct Connection {
    path: PathBuf,
    handle: Mutex<rusqlite::Connection>,
}

impl Connection {
    /// Open an existing database file in read-write mode.
    ///
    /// The engine's own busy timeout is switched off; contention is handled by
    /// the retry policy of each query.
    ///
    /// # Errors
    /// Returns `SqlwError::ConfigError` if `path` is missing or not a regular
    /// file, and `SqlwError::SqliteError` if the engine refuses to open it.
    pub fn open(path: &Path) -> Result<Self, SqlwError> {
        let is_file = std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            return Err(SqlwError::ConfigError(format!(
                "Database Not Found: {}",
                path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let handle = rusqlite::Connection::open_with_flags(path, flags)?;
        handle.busy_timeout(Duration::ZERO)?;

        tracing::info!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            path: path.to_path_buf(),
            handle: Mutex::new(handle),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the engine handle is free and take it.
    ///
    /// A guard dropped during a panic leaves the mutex poisoned. Every statement
    /// is reset before its guard goes away, so the handle itself is still
    /// consistent and the poison is cleared here.
    pub fn lock(&self) -> ConnectionGuard<'_> {
        let guard = self.handle.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(path = %self.path.display(), "recovering poisoned connection lock");
            self.handle.clear_poison();
            poisoned.into_inner()
        });
        ConnectionGuard { guard }
    }

    /// Take the engine handle only if nobody holds it.
    pub fn try_lock(&self) -> Option<ConnectionGuard<'_>> {
        match self.handle.try_lock() {
            Ok(guard) => Some(ConnectionGuard { guard }),
            Err(TryLockError::Poisoned(poisoned)) => {
                self.handle.clear_poison();
                Some(ConnectionGuard {
                    guard: poisoned.into_inner(),
                })
            }
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Grow the compiled-statement cache so `count` statements never evict each other.
    pub(crate) fn reserve_statements(&self, count: usize) {
        let guard = self.lock();
        // rusqlite's default capacity is 16.
        guard.set_prepared_statement_cache_capacity(count.max(16));
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let handle = match self.handle.get_mut() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Finalizes every cached statement exactly once.
        handle.flush_prepared_statement_cache();
        tracing::debug!(path = %self.path.display(), "closing sqlite database");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the engine handle. Released on drop.
pub struct ConnectionGuard<'c> {
    guard: MutexGuard<'c, rusqlite::Connection>,
}

impl Deref for ConnectionGuard<'_> {
    type Target = rusqlite::Connection;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for ConnectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
