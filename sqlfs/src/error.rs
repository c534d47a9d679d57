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

//! Error taxonomy mapped to POSIX error numbers at the filesystem boundary.

use std::{cell::RefCell, error, fmt, result};

/// SQLFuse result type.
pub type Result<T> = result::Result<T, Error>;

/// Classification of an error condition. Each kind maps to exactly one
/// POSIX error number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path does not parse, object is absent, or the connection was lost.
    NotFound,
    /// Authentication, privilege or disallowed-database failure.
    AccessDenied,
    /// Unique-key or duplicate-object violation on write.
    Exists,
    /// Parse error, syntax error, bad field, truncation or constraint.
    InvalidArgument,
    /// Lock-wait timeout, deadlock, or pool acquisition deadline.
    Timeout,
    /// Target is read-only, or the mount is globally read-only.
    ReadOnly,
    /// Tablespace or data file full.
    NoSpace,
    /// Lock table full, too many concurrent transactions.
    Busy,
    /// Directory operation attempted on a file path.
    IsDirectory,
    /// File operation attempted on a directory path.
    NotDirectory,
    /// Operation referenced a handle that is no longer open.
    BadHandle,
    /// The connection pool is draining.
    Shutdown,
    /// Anything unmapped.
    Io,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::Exists => "already exists",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Timeout => "timed out",
            ErrorKind::ReadOnly => "read-only",
            ErrorKind::NoSpace => "no space",
            ErrorKind::Busy => "busy",
            ErrorKind::IsDirectory => "is a directory",
            ErrorKind::NotDirectory => "not a directory",
            ErrorKind::BadHandle => "bad file handle",
            ErrorKind::Shutdown => "shutting down",
            ErrorKind::Io => "i/o error",
        }
    }
}

/// An error carrying its taxonomy kind, a human-readable message and a flag
/// marking it as worth retrying (connection lost, lock-wait timeout,
/// deadlock, too many concurrent transactions).
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    retryable: bool,
}

impl Error {
    pub fn new<M: Into<String>>(kind: ErrorKind, message: M) -> Error {
        Error { kind, message: message.into(), retryable: false }
    }

    pub fn retryable<M: Into<String>>(kind: ErrorKind, message: M) -> Error {
        Error { kind, message: message.into(), retryable: true }
    }

    pub fn not_found<M: Into<String>>(message: M) -> Error {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn access_denied<M: Into<String>>(message: M) -> Error {
        Error::new(ErrorKind::AccessDenied, message)
    }

    pub fn exists<M: Into<String>>(message: M) -> Error {
        Error::new(ErrorKind::Exists, message)
    }

    pub fn invalid<M: Into<String>>(message: M) -> Error {
        Error::new(ErrorKind::InvalidArgument, message)
    }

    pub fn timeout<M: Into<String>>(message: M) -> Error {
        Error::new(ErrorKind::Timeout, message)
    }

    pub fn read_only() -> Error {
        Error::new(ErrorKind::ReadOnly, "target is read-only")
    }

    pub fn is_directory() -> Error {
        Error::new(ErrorKind::IsDirectory, "target is a directory")
    }

    pub fn not_directory() -> Error {
        Error::new(ErrorKind::NotDirectory, "target is not a directory")
    }

    pub fn bad_handle(handle: u64) -> Error {
        Error::new(ErrorKind::BadHandle, format!("no open file for handle {}", handle))
    }

    pub fn shutdown() -> Error {
        Error::new(ErrorKind::Shutdown, "connection pool is draining")
    }

    pub fn io<M: Into<String>>(message: M) -> Error {
        Error::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// The POSIX error number surfaced at the filesystem boundary.
    pub fn errno(&self) -> i32 {
        match self.kind {
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::AccessDenied => libc::EACCES,
            ErrorKind::Exists => libc::EEXIST,
            ErrorKind::InvalidArgument => libc::EINVAL,
            ErrorKind::Timeout => libc::ETIMEDOUT,
            ErrorKind::ReadOnly => libc::EROFS,
            ErrorKind::NoSpace => libc::ENOSPC,
            ErrorKind::Busy => libc::EBUSY,
            ErrorKind::IsDirectory => libc::EISDIR,
            ErrorKind::NotDirectory => libc::ENOTDIR,
            ErrorKind::BadHandle => libc::EBADF,
            ErrorKind::Shutdown => libc::EIO,
            ErrorKind::Io => libc::EIO,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

impl error::Error for Error {}

thread_local! {
    static BREADCRUMBS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Scoped breadcrumb for diagnostic logging. Pushes a label on
/// construction, pops it on drop. The accumulated trail
/// (`"readdir > tables > list_tables"`) never affects control flow.
pub struct ErrorContext {
    _private: (),
}

impl ErrorContext {
    pub fn enter<L: Into<String>>(label: L) -> ErrorContext {
        BREADCRUMBS.with(|stack| stack.borrow_mut().push(label.into()));
        ErrorContext { _private: () }
    }

    /// The current breadcrumb trail for this thread.
    pub fn current() -> String {
        BREADCRUMBS.with(|stack| stack.borrow().join(" > "))
    }
}

impl Drop for ErrorContext {
    fn drop(&mut self) {
        BREADCRUMBS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_follows_taxonomy() {
        assert_eq!(Error::not_found("x").errno(), libc::ENOENT);
        assert_eq!(Error::access_denied("x").errno(), libc::EACCES);
        assert_eq!(Error::exists("x").errno(), libc::EEXIST);
        assert_eq!(Error::invalid("x").errno(), libc::EINVAL);
        assert_eq!(Error::timeout("x").errno(), libc::ETIMEDOUT);
        assert_eq!(Error::read_only().errno(), libc::EROFS);
        assert_eq!(Error::new(ErrorKind::NoSpace, "x").errno(), libc::ENOSPC);
        assert_eq!(Error::new(ErrorKind::Busy, "x").errno(), libc::EBUSY);
        assert_eq!(Error::is_directory().errno(), libc::EISDIR);
        assert_eq!(Error::not_directory().errno(), libc::ENOTDIR);
        assert_eq!(Error::io("x").errno(), libc::EIO);
    }

    #[test]
    fn retryable_flag_survives() {
        let err = Error::retryable(ErrorKind::Timeout, "deadlock");
        assert!(err.is_retryable());
        assert!(!Error::timeout("deadline").is_retryable());
    }

    #[test]
    fn breadcrumbs_nest_and_unwind() {
        assert_eq!(ErrorContext::current(), "");
        let _outer = ErrorContext::enter("readdir");
        {
            let _mid = ErrorContext::enter("tables");
            let _inner = ErrorContext::enter("list_tables");
            assert_eq!(ErrorContext::current(), "readdir > tables > list_tables");
        }
        assert_eq!(ErrorContext::current(), "readdir");
    }
}
