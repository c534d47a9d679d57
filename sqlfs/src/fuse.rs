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

//! Kernel-interface adapter: translates the inode-based FUSE protocol to
//! the engine's path-based operations.
//!
//! The engine stays path-addressed (the protocol library is an external
//! collaborator), so this module keeps an inode ↔ path table. Opens reply
//! with direct-IO so the kernel never trusts the placeholder sizes from
//! `getattr`.

use std::{
    collections::HashMap,
    ffi::OsStr,
    io,
    sync::Arc,
    time::{Duration, SystemTime},
};

use fuser::{
    consts::FOPEN_DIRECT_IO, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite,
    Request, TimeOrNow,
};
use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    config::Config,
    engine::{FileAttributes, FilesystemEngine},
    error::Result,
};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INODE: u64 = 1;

struct InodeTable {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> InodeTable {
        let mut table = InodeTable {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next: ROOT_INODE + 1,
        };
        table.by_ino.insert(ROOT_INODE, "/".to_string());
        table.by_path.insert("/".to_string(), ROOT_INODE);
        table
    }

    fn intern(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).cloned()
    }
}

fn join_path(parent: &str, name: &OsStr) -> Option<String> {
    let name = name.to_str()?;
    if parent == "/" {
        Some(format!("/{}", name))
    } else {
        Some(format!("{}/{}", parent, name))
    }
}

/// The mounted filesystem object handed to the protocol library.
pub struct SqlFuseFs {
    engine: Arc<FilesystemEngine>,
    inodes: Mutex<InodeTable>,
}

impl SqlFuseFs {
    pub fn new(engine: Arc<FilesystemEngine>) -> SqlFuseFs {
        SqlFuseFs { engine, inodes: Mutex::new(InodeTable::new()) }
    }

    fn file_attr(&self, ino: u64, attrs: FileAttributes, req: &Request) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino,
            size: attrs.size,
            blocks: (attrs.size + 511) / 512,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: if attrs.is_dir { FileType::Directory } else { FileType::RegularFile },
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: req.uid(),
            gid: req.gid(),
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }

    fn attr_for_path(&self, path: &str, req: &Request) -> Result<FileAttr> {
        let attrs = self.engine.getattr(path)?;
        let ino = self.inodes.lock().intern(path);
        Ok(self.file_attr(ino, attrs, req))
    }
}

impl Filesystem for SqlFuseFs {
    fn destroy(&mut self) {
        info!("filesystem unmounted");
        self.engine.shutdown();
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent_path = match self.inodes.lock().path_of(parent) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        let path = match join_path(&parent_path, name) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        match self.attr_for_path(&path, req) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        let path = match self.inodes.lock().path_of(ino) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        match self.engine.getattr(&path) {
            Ok(attrs) => reply.attr(&TTL, &self.file_attr(ino, attrs, req)),
            Err(e) => reply.error(e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.inodes.lock().path_of(ino) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        if let Some(size) = size {
            if let Err(e) = self.engine.truncate(&path, size, fh) {
                return reply.error(e.errno());
            }
        }
        // Mode, ownership and timestamps are accepted and ignored;
        // virtual files have none of their own.
        match self.engine.getattr(&path) {
            Ok(attrs) => reply.attr(&TTL, &self.file_attr(ino, attrs, req)),
            Err(_) if fh.is_some() => {
                // A freshly created row file has no backing row until the
                // handle flushes; report it as an empty writable file.
                let attrs = FileAttributes { is_dir: false, perm: 0o644, nlink: 1, size: 0 };
                reply.attr(&TTL, &self.file_attr(ino, attrs, req));
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = match self.inodes.lock().path_of(ino) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        let entries = match self.engine.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };

        let mut all: Vec<(u64, FileType, String)> = Vec::with_capacity(entries.len() + 2);
        all.push((ino, FileType::Directory, ".".to_string()));
        all.push((ino, FileType::Directory, "..".to_string()));
        {
            let mut inodes = self.inodes.lock();
            for entry in entries {
                let child = match join_path(&path, OsStr::new(&entry.name)) {
                    Some(child) => child,
                    None => continue,
                };
                let child_ino = inodes.intern(&child);
                let kind =
                    if entry.is_dir { FileType::Directory } else { FileType::RegularFile };
                all.push((child_ino, kind, entry.name));
            }
        }

        for (i, (child_ino, kind, name)) in
            all.into_iter().enumerate().skip(offset as usize)
        {
            if reply.add(child_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.inodes.lock().path_of(ino) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        let write = flags & libc::O_ACCMODE != libc::O_RDONLY;
        match self.engine.open(&path, write) {
            Ok(handle) => reply.opened(handle, FOPEN_DIRECT_IO),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let parent_path = match self.inodes.lock().path_of(parent) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        let path = match join_path(&parent_path, name) {
            Some(path) => path,
            None => return reply.error(libc::EINVAL),
        };
        match self.engine.create(&path) {
            Ok(handle) => {
                let ino = self.inodes.lock().intern(&path);
                // The row does not exist yet; report an empty writable file.
                let attrs = FileAttributes { is_dir: false, perm: 0o644, nlink: 1, size: 0 };
                let attr = self.file_attr(ino, attrs, req);
                reply.created(&TTL, &attr, 0, handle, FOPEN_DIRECT_IO);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.engine.read(fh, offset as u64, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.engine.write(fh, offset as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.engine.flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.engine.release(fh);
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_path = match self.inodes.lock().path_of(parent) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        let path = match join_path(&parent_path, name) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };
        match self.engine.unlink(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let stats = self.engine.statfs();
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namemax,
            stats.frsize,
        );
    }
}

/// Mount the engine and run the event loop until unmounted.
pub fn mount(engine: Arc<FilesystemEngine>, config: &Config) -> io::Result<()> {
    let mut options = vec![
        MountOption::FSName("sqlfuse".to_string()),
        MountOption::Subtype("sqlfuse".to_string()),
        MountOption::NoAtime,
    ];
    if config.security.read_only {
        options.push(MountOption::RO);
    }
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.allow_root {
        options.push(MountOption::AllowRoot);
    }

    debug!("mounting at {} with {:?}", config.mountpoint, options);
    fuser::mount2(SqlFuseFs::new(engine), &config.mountpoint, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_table_interns_stably() {
        let mut table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INODE), Some("/".to_string()));
        let a = table.intern("/db");
        let b = table.intern("/db/tables");
        assert_ne!(a, b);
        assert_eq!(table.intern("/db"), a);
        assert_eq!(table.path_of(a), Some("/db".to_string()));
        assert_eq!(table.path_of(999), None);
    }

    #[test]
    fn path_joining() {
        assert_eq!(join_path("/", OsStr::new("db")), Some("/db".to_string()));
        assert_eq!(
            join_path("/db/tables", OsStr::new("t.csv")),
            Some("/db/tables/t.csv".to_string())
        );
    }
}
