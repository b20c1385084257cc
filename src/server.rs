//! The kernel bridge: translates FUSE requests into core operations.
//!
//! The kernel addresses objects by inode number while the core API is
//! path-addressed, so the bridge keeps an ino → path table, seeded with the
//! root and fed by every successful lookup or creation. FUSE inode numbers
//! are the on-disk index shifted by one, the kernel reserving ino 1 for the
//! root (inode 0).

use fuse::{
    FileAttr, FileType, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyWrite, Request,
};
use imgfs::inode::DIR_MODE_BIT;
use imgfs::ops::Attr;
use imgfs::{Filesystem, BLOCK_SIZE};
use std::collections::HashMap;
use std::ffi::OsStr;
use time::Timespec;

/// How long the kernel may cache replies.
const TTL: Timespec = Timespec { sec: 1, nsec: 0 };
/// Timestamps are not maintained; everything reports the epoch.
const EPOCH: Timespec = Timespec { sec: 0, nsec: 0 };

/// The mounted file server.
pub struct Bridge {
    fs: Filesystem,
    /// Paths of the inode numbers handed to the kernel.
    paths: HashMap<u64, String>,
}

impl Bridge {
    pub fn new(fs: Filesystem) -> Self {
        let mut paths = HashMap::new();
        paths.insert(fuse::FUSE_ROOT_ID, "/".to_owned());
        Self { fs, paths }
    }

    /// The kernel-facing inode number for an on-disk index.
    fn ino(index: i32) -> u64 {
        index as u64 + 1
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    /// The path of `name` under the directory known as `parent`.
    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent = self.paths.get(&parent)?;
        let name = name.to_str()?;
        if parent == "/" {
            Some(format!("/{name}"))
        } else {
            Some(format!("{parent}/{name}"))
        }
    }

    /// Resolves `path` and builds its kernel attribute record.
    fn attr_of(&self, path: &str) -> Option<(i32, FileAttr)> {
        let index = self.fs.find_inode_index(path);
        if index < 0 {
            return None;
        }
        let attr = self.fs.getattr(path).ok()?;
        Some((index, file_attr(Self::ino(index), &attr)))
    }

    /// Replies to a lookup-like request with the entry at `path`, remembering
    /// its inode number.
    fn reply_entry(&mut self, path: String, reply: ReplyEntry) {
        match self.attr_of(&path) {
            Some((index, attr)) => {
                self.paths.insert(Self::ino(index), path);
                reply.entry(&TTL, &attr, 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }
}

/// Builds the kernel-facing attribute record.
fn file_attr(ino: u64, attr: &Attr) -> FileAttr {
    let kind = if attr.mode & DIR_MODE_BIT != 0 {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    FileAttr {
        ino,
        size: attr.size as u64,
        blocks: (attr.size as u64).div_ceil(BLOCK_SIZE as u64),
        atime: EPOCH,
        mtime: EPOCH,
        ctime: EPOCH,
        crtime: EPOCH,
        kind,
        perm: (attr.mode & 0o7777) as u16,
        nlink: 1,
        uid: attr.uid,
        gid: 0,
        rdev: 0,
        flags: 0,
    }
}

impl fuse::Filesystem for Bridge {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.reply_entry(path, reply);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(attr) => {
                println!(
                    "getattr({path}) -> (0) {{mode: {:o}, size: {}}}",
                    attr.mode, attr.size
                );
                reply.attr(&TTL, &file_attr(ino, &attr));
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<Timespec>,
        mtime: Option<Timespec>,
        _fh: Option<u64>,
        _crtime: Option<Timespec>,
        _chgtime: Option<Timespec>,
        _bkuptime: Option<Timespec>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(size) = size {
            if let Err(e) = self.fs.truncate(&path, size as i64) {
                reply.error(e.errno());
                return;
            }
            println!("truncate({path}, {size} bytes) -> 0");
        }
        if let Some(mode) = mode {
            let _ = self.fs.chmod(&path, mode as i32);
            println!("chmod({path}, {mode:o}) -> 0");
        }
        if atime.is_some() || mtime.is_some() {
            let _ = self.fs.utimens(&path);
            println!("utimens({path}) -> 0");
        }
        match self.fs.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &file_attr(ino, &attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::EPERM);
            return;
        };
        match self.fs.mknod(&path, mode as i32) {
            Ok(()) => {
                println!("mknod({path}, {mode:o}) -> 0");
                self.reply_entry(path, reply);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::EPERM);
            return;
        };
        match self.fs.mkdir(&path, mode as i32) {
            Ok(()) => {
                println!("mkdir({path}) -> 0");
                self.reply_entry(path, reply);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.unlink(&path) {
            Ok(()) => {
                println!("unlink({path}) -> 0");
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rmdir(&path) {
            Ok(()) => {
                println!("rmdir({path}) -> 0");
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (Some(from), Some(to)) = (self.path_of(ino), self.child_path(newparent, newname))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.link(&from, &to) {
            Ok(()) => {
                println!("link({from} => {to}) -> 0");
                self.reply_entry(to, reply);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEmpty,
    ) {
        let (Some(from), Some(to)) = (
            self.child_path(parent, name),
            self.child_path(newparent, newname),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rename(&from, &to) {
            Ok(()) => {
                let index = self.fs.find_inode_index(&to);
                if index >= 0 {
                    self.paths.insert(Self::ino(index), to.clone());
                }
                println!("rename({from} => {to}) -> 0");
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: u32, reply: ReplyOpen) {
        if let Some(path) = self.path_of(ino) {
            let _ = self.fs.open_file(&path);
            println!("open({path}) -> 0");
        }
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match self.fs.read(&path, &mut buf, offset) {
            Ok(n) => {
                println!("read({path}, {size} bytes, @+{offset}) -> {n}");
                reply.data(&buf[..n]);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _flags: u32,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.write(&path, data, offset) {
            Ok(n) => {
                println!("write({path}, {} bytes, @+{offset}) -> {n}", data.len());
                reply.written(n as u32);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let names = match self.fs.readdir(&path) {
            Ok(names) => names,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        for (i, name) in names.iter().enumerate().skip(offset as usize) {
            let child = if path == "/" {
                format!("/{name}")
            } else {
                format!("{path}/{name}")
            };
            let Some((index, attr)) = self.attr_of(&child) else {
                continue;
            };
            if reply.add(Self::ino(index), (i + 1) as i64, attr.kind, name) {
                break;
            }
        }
        println!("readdir({path}) -> 0");
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: u32, reply: ReplyEmpty) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.access(&path) {
            Ok(()) => {
                println!("access({path}, {mask:o}) -> 0");
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }
}
