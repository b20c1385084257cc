/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Storage engine of a single-user filesystem living inside one fixed-size
//! disk image.
//!
//! The image is memory-mapped and treated as a byte-addressable block device:
//! block 0 holds the allocation bitmaps and the inode table, block 1 holds the
//! pool of chain nodes linking each inode to its data blocks, and every other
//! block is file or directory content. The [`ops::Filesystem`] value ties the
//! layers together and is what the kernel-bridge adapter talks to.

pub mod bitmap;
pub mod chain;
pub mod directory;
pub mod error;
pub mod image;
pub mod inode;
pub mod ops;

pub use error::FsError;
pub use ops::Filesystem;

/// The number of blocks the image is split into.
pub const BLOCK_COUNT: usize = 256;
/// The size of a block in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// The total size of the disk image in bytes.
pub const IMAGE_SIZE: usize = BLOCK_COUNT * BLOCK_SIZE;

/// The size of the block bitmap in bytes, tracking every block of the image.
pub const BLOCK_BITMAP_SIZE: usize = BLOCK_COUNT / 8;
/// The size of the inode bitmap in bytes.
///
/// Block 0 keeps `BLOCK_SIZE - BLOCK_BITMAP_SIZE` bytes for the inode bitmap
/// and the inode table together; each byte of bitmap accounts for 8 inode
/// records.
pub const INODE_BITMAP_SIZE: usize =
    (BLOCK_SIZE - BLOCK_BITMAP_SIZE) / (inode::RECORD_SIZE * 8 + 1);
/// The number of inode slots in the inode table.
pub const INODE_COUNT: usize = 8 * INODE_BITMAP_SIZE;
