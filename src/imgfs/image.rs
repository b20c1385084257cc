//! A block-addressed view of the memory-mapped disk image.

use crate::bitmap;
use crate::{BLOCK_BITMAP_SIZE, BLOCK_COUNT, BLOCK_SIZE, IMAGE_SIZE, INODE_BITMAP_SIZE};
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Error;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::null_mut;
use std::slice;

/// The disk image, mapped shared read/write for the lifetime of this value.
///
/// Every persistent structure of the filesystem lives inside the mapping; the
/// accessors hand out byte regions at the fixed offsets of the on-disk layout,
/// and cross-structure references are plain integer indices into those
/// regions.
pub struct Image {
    /// The backing file. Kept open as long as the mapping lives.
    _file: File,
    /// The base address of the mapping.
    base: *mut u8,
}

impl Image {
    /// Opens or creates the image at `path`, truncates it to its fixed size
    /// and maps it.
    ///
    /// Blocks 0 and 1 are reserved for the metadata block and the chain pool;
    /// their bitmap bits are set here and never cleared.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(IMAGE_SIZE as u64)?;
        let base = unsafe {
            libc::mmap(
                null_mut(),
                IMAGE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }
        let mut img = Self {
            _file: file,
            base: base as *mut u8,
        };
        let bbm = img.blocks_bitmap_mut();
        bitmap::set(bbm, 0, true);
        bitmap::set(bbm, 1, true);
        Ok(img)
    }

    fn region(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= IMAGE_SIZE);
        unsafe { slice::from_raw_parts(self.base.add(offset), len) }
    }

    fn region_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset + len <= IMAGE_SIZE);
        unsafe { slice::from_raw_parts_mut(self.base.add(offset), len) }
    }

    /// Returns the contents of the block at `index`.
    pub fn block(&self, index: i32) -> &[u8] {
        self.region(block_offset(index), BLOCK_SIZE)
    }

    /// Returns the contents of the block at `index`, mutably.
    pub fn block_mut(&mut self, index: i32) -> &mut [u8] {
        self.region_mut(block_offset(index), BLOCK_SIZE)
    }

    /// Returns the block bitmap, at the very start of block 0.
    pub fn blocks_bitmap(&self) -> &[u8] {
        self.region(0, BLOCK_BITMAP_SIZE)
    }

    /// Returns the block bitmap, mutably.
    pub fn blocks_bitmap_mut(&mut self) -> &mut [u8] {
        self.region_mut(0, BLOCK_BITMAP_SIZE)
    }

    /// Returns the inode bitmap, right after the block bitmap.
    pub fn inode_bitmap(&self) -> &[u8] {
        self.region(BLOCK_BITMAP_SIZE, INODE_BITMAP_SIZE)
    }

    /// Returns the inode bitmap, mutably.
    pub fn inode_bitmap_mut(&mut self) -> &mut [u8] {
        self.region_mut(BLOCK_BITMAP_SIZE, INODE_BITMAP_SIZE)
    }

    /// Allocates a block from the data pool and returns its index, or `-1`
    /// when no block is free.
    ///
    /// The scan is first-fit over indices 2..255; the reserved blocks are
    /// skipped.
    pub fn alloc_block(&mut self) -> i32 {
        for i in 2..BLOCK_COUNT {
            if !bitmap::get(self.blocks_bitmap(), i) {
                bitmap::set(self.blocks_bitmap_mut(), i, true);
                return i as i32;
            }
        }
        -1
    }

    /// Returns the block at `index` to the pool. The block contents are left
    /// in place.
    pub fn free_block(&mut self, index: i32) {
        let index = usize::try_from(index).unwrap();
        bitmap::set(self.blocks_bitmap_mut(), index, false);
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, IMAGE_SIZE);
        }
    }
}

/// Returns the byte offset of the block at `index` within the image.
fn block_offset(index: i32) -> usize {
    let index = usize::try_from(index).unwrap();
    assert!(index < BLOCK_COUNT);
    index * BLOCK_SIZE
}
