//! The operation façade the kernel-bridge adapter calls into.

use crate::bitmap;
use crate::chain;
use crate::directory;
use crate::error::FsError;
use crate::image::Image;
use crate::inode;
use crate::BLOCK_SIZE;
use std::cmp::min;
use std::io;
use std::path::Path;

/// The attributes reported for one filesystem object.
#[derive(Clone, Copy, Debug)]
pub struct Attr {
    /// Type and permission bits.
    pub mode: i32,
    /// Content size in bytes.
    pub size: i64,
    /// Owning user, always the user running the server.
    pub uid: u32,
}

/// The whole filesystem: the mapped image and the operations over it.
///
/// Exactly one value exists per mounted image. Every mutation takes it by
/// exclusive reference, which keeps the engine single-caller in-process; the
/// adapter serializes calls on one session thread.
pub struct Filesystem {
    img: Image,
}

impl Filesystem {
    /// Opens the image at `path`, setting the root directory up if the image
    /// is fresh.
    ///
    /// Re-opening an existing image changes nothing: the root is recognized
    /// by its inode bitmap bit.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut img = Image::open(path)?;
        if !bitmap::get(img.inode_bitmap(), 0) {
            let root = directory::init_root(&mut img);
            println!("root: {root}");
            println!("{}", inode::read(&img, root));
        }
        Ok(Self { img })
    }

    /// Returns the mapped image, for inspection.
    pub fn image(&self) -> &Image {
        &self.img
    }

    /// Resolves `path` to its inode index, `-1` if it names nothing.
    pub fn find_inode_index(&self, path: &str) -> i32 {
        directory::find_inode_index(&self.img, path)
    }

    /// Checks that `path` names an existing object.
    pub fn access(&self, path: &str) -> Result<(), FsError> {
        if self.find_inode_index(path) < 0 {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    /// Returns the attributes of the object at `path`.
    pub fn getattr(&self, path: &str) -> Result<Attr, FsError> {
        let index = self.find_inode_index(path);
        if index < 0 {
            return Err(FsError::NotFound);
        }
        let node = inode::read(&self.img, index);
        Ok(Attr {
            mode: node.mode,
            size: node.size as i64,
            uid: unsafe { libc::getuid() },
        })
    }

    /// Lists the entry names of the directory at `path`.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        if self.find_inode_index(path) < 0 {
            return Err(FsError::NotFound);
        }
        Ok(directory::list(&self.img, path))
    }

    /// Creates a file at `path` with the given mode.
    ///
    /// The new inode starts with one link and an empty content block; the
    /// insertion into the parent adds a second link. A failure past inode
    /// allocation leaves the inode claimed: there is no rollback.
    pub fn mknod(&mut self, path: &str, mode: i32) -> Result<(), FsError> {
        let index = inode::alloc(&mut self.img);
        if index < 0 {
            return Err(FsError::InodesExhausted);
        }
        let head = chain::alloc(&mut self.img);
        assert!(head > 0, "chain pool exhausted");
        let node = inode::Inode {
            refs: 1,
            mode,
            size: 0,
            head_chain: head,
        };
        inode::write(&mut self.img, index, &node);

        let parent = directory::parent_inode_index(&self.img, path);
        if parent < 0 {
            return Err(FsError::ParentMissing);
        }
        directory::put(&mut self.img, parent, &directory::filename(path), index);
        Ok(())
    }

    /// Creates a directory at `path`.
    pub fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), FsError> {
        self.mknod(path, mode | inode::DIR_MODE_BIT)
    }

    /// Removes the entry at `path` from its parent directory.
    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let parent = directory::parent_inode_index(&self.img, path);
        if parent < 0 {
            return Err(FsError::ParentMissing);
        }
        directory::delete(&mut self.img, parent, path);
        Ok(())
    }

    /// Binds the additional name `to` to the object at `from`, adding a link.
    pub fn link(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let index = self.find_inode_index(from);
        if index < 0 {
            return Err(FsError::NotFound);
        }
        let parent = directory::parent_inode_index(&self.img, to);
        if parent < 0 {
            return Err(FsError::ParentMissing);
        }
        directory::put(&mut self.img, parent, &directory::filename(to), index);
        Ok(())
    }

    /// Removes the directory at `path`.
    ///
    /// The target must be empty and carry exactly the mode the root is created
    /// with; anything else is refused.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let index = self.find_inode_index(path);
        if index < 0 {
            return Err(FsError::NotFound);
        }
        if inode::read(&self.img, index).mode != directory::ROOT_MODE {
            return Err(FsError::NotRemovable);
        }
        if !directory::list(&self.img, path).is_empty() {
            return Err(FsError::NotRemovable);
        }
        self.unlink(path)
    }

    /// Moves the object at `from` to `to`.
    ///
    /// A link under the new name followed by an unlink of the old one; the
    /// object's link count is unchanged overall.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        self.link(from, to)?;
        self.unlink(from)
    }

    /// Mode changes are accepted and ignored.
    pub fn chmod(&mut self, _path: &str, _mode: i32) -> Result<(), FsError> {
        Ok(())
    }

    /// Timestamp updates are accepted and ignored.
    pub fn utimens(&mut self, _path: &str) -> Result<(), FsError> {
        Ok(())
    }

    /// Extended operations are accepted and ignored.
    pub fn ioctl(&mut self, _path: &str, _cmd: i32) -> Result<(), FsError> {
        Ok(())
    }

    /// No per-file state is kept, so opening always succeeds.
    pub fn open_file(&self, _path: &str) -> Result<(), FsError> {
        Ok(())
    }

    /// Resizes the file at `path` to `size` bytes.
    pub fn truncate(&mut self, path: &str, size: i64) -> Result<(), FsError> {
        let index = self.find_inode_index(path);
        if index < 0 {
            return Err(FsError::NotFound);
        }
        let node = inode::read(&self.img, index);
        if size >= node.size as i64 {
            inode::grow(&mut self.img, index, size as i32);
        } else {
            inode::shrink(&mut self.img, index, size as i32);
        }
        Ok(())
    }

    /// Reads from the file at `path` into `buf`, sized by the caller to the
    /// request.
    ///
    /// Content is copied one whole block per chain hop starting from the head
    /// of the file, clamped to `buf`; `offset` only gates the end-of-file
    /// check. Returns the request size, or 0 when `offset` is at or past the
    /// end.
    pub fn read(&self, path: &str, buf: &mut [u8], offset: i64) -> Result<usize, FsError> {
        let index = self.find_inode_index(path);
        if index < 0 {
            return Err(FsError::NotFound);
        }
        let node = inode::read(&self.img, index);
        if offset >= node.size as i64 {
            return Ok(0);
        }
        let mut cur = node.head_chain;
        let mut hop = 0usize;
        loop {
            let cell = chain::read(&self.img, cur);
            let dst = hop * BLOCK_SIZE;
            if dst < buf.len() {
                let len = min(BLOCK_SIZE, buf.len() - dst);
                buf[dst..dst + len].copy_from_slice(&self.img.block(cell.block)[..len]);
            }
            if cell.next == 0 {
                break;
            }
            cur = cell.next;
            hop += 1;
        }
        Ok(buf.len())
    }

    /// Writes `buf` into the file at `path`.
    ///
    /// Only the block at `offset / BLOCK_SIZE` receives the payload, clamped
    /// to one block; the chain is grown first and the resulting file size is
    /// `offset + buf.len()`.
    pub fn write(&mut self, path: &str, buf: &[u8], offset: i64) -> Result<usize, FsError> {
        let index = self.find_inode_index(path);
        if index < 0 {
            return Err(FsError::NotFound);
        }
        let mut node = inode::read(&self.img, index);
        node.size = buf.len() as i32;
        inode::write(&mut self.img, index, &node);
        inode::grow(&mut self.img, index, (offset + buf.len() as i64) as i32);

        let node = inode::read(&self.img, index);
        let target = (offset / BLOCK_SIZE as i64) as usize;
        let mut cur = node.head_chain;
        let mut hop = 0usize;
        loop {
            let cell = chain::read(&self.img, cur);
            if hop == target {
                let len = min(BLOCK_SIZE, buf.len());
                self.img.block_mut(cell.block)[..len].copy_from_slice(&buf[..len]);
            }
            if cell.next == 0 {
                break;
            }
            cur = cell.next;
            hop += 1;
        }
        Ok(buf.len())
    }
}
