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

//! Inode records and the operations growing and shrinking their block chains.

use crate::bitmap;
use crate::chain;
use crate::image::Image;
use crate::{BLOCK_BITMAP_SIZE, BLOCK_SIZE, INODE_BITMAP_SIZE, INODE_COUNT};
use std::fmt;

/// The size of an inode record on disk in bytes.
pub const RECORD_SIZE: usize = 16;

/// The mode bit marking an inode as a directory.
pub const DIR_MODE_BIT: i32 = 0o040000;

/// The offset of the inode table within block 0.
const TABLE_OFFSET: usize = BLOCK_BITMAP_SIZE + INODE_BITMAP_SIZE;

/// An inode record: one file or directory of the filesystem.
///
/// All four fields are 32-bit little-endian on disk. The record does not store
/// the block list itself but the pool index of its head chain node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Inode {
    /// Hard-link count.
    pub refs: i32,
    /// Type and permission bits.
    pub mode: i32,
    /// Content size in bytes.
    pub size: i32,
    /// Pool index of the head node of the block chain.
    pub head_chain: i32,
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ref count {}", self.refs)?;
        writeln!(f, "mode: {:o}", self.mode)?;
        writeln!(f, "size (bytes): {}", self.size)?;
        write!(f, "chain head: {}", self.head_chain)
    }
}

/// Reads the inode record at `index`.
pub fn read(img: &Image, index: i32) -> Inode {
    let off = record_offset(index);
    let table = img.block(0);
    let field = |i: usize| i32::from_le_bytes(table[off + i * 4..off + i * 4 + 4].try_into().unwrap());
    Inode {
        refs: field(0),
        mode: field(1),
        size: field(2),
        head_chain: field(3),
    }
}

/// Writes the inode record at `index`.
pub fn write(img: &mut Image, index: i32, node: &Inode) {
    let off = record_offset(index);
    let table = img.block_mut(0);
    for (i, value) in [node.refs, node.mode, node.size, node.head_chain]
        .into_iter()
        .enumerate()
    {
        table[off + i * 4..off + i * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Claims the first free slot of the inode table and returns its index, or
/// `-1` when the table is full.
pub fn alloc(img: &mut Image) -> i32 {
    for i in 0..INODE_COUNT {
        if !bitmap::get(img.inode_bitmap(), i) {
            bitmap::set(img.inode_bitmap_mut(), i, true);
            return i as i32;
        }
    }
    -1
}

/// Frees the inode at `index`, returning every data block of its chain to the
/// pool and clearing its bitmap bit.
pub fn free(img: &mut Image, index: i32) {
    let node = read(img, index);
    let mut cur = node.head_chain;
    loop {
        let mut cell = chain::read(img, cur);
        img.free_block(cell.block);
        cell.block = 0;
        chain::write(img, cur, &cell);
        if cell.next == 0 {
            break;
        }
        cur = cell.next;
    }
    bitmap::set(img.inode_bitmap_mut(), index as usize, false);
    let mut node = read(img, index);
    node.refs -= 1;
    write(img, index, &node);
}

/// Extends the chain of the inode at `index` until it covers `size` bytes,
/// then records the new size.
///
/// Chain nodes past the current tail are linked in lazily, one per missing
/// block.
pub fn grow(img: &mut Image, index: i32, size: i32) -> i32 {
    let node = read(img, index);
    let mut cur = node.head_chain;
    let mut covered: i32 = 1;
    while covered * (BLOCK_SIZE as i32) < size {
        let mut cell = chain::read(img, cur);
        if cell.next == 0 {
            cell.next = chain::alloc(img);
            chain::write(img, cur, &cell);
        }
        cur = cell.next;
        covered += 1;
    }
    let mut node = read(img, index);
    node.size = size;
    write(img, index, &node);
    0
}

/// Shrinks the inode at `index` to `size` bytes.
///
/// The loop condition reads the size field it is decrementing, and the index
/// handed back to the block pool is the `next` link of the visited node.
/// TODO reclaim the chain nodes themselves on shrink.
pub fn shrink(img: &mut Image, index: i32, size: i32) -> i32 {
    let mut node = read(img, index);
    let mut cur = node.head_chain;
    let mut hops: i32 = 1;
    while hops * node.size > size {
        let cell = chain::read(img, cur);
        if cell.next != 0 {
            img.free_block(cell.next);
        }
        cur = cell.next;
        node.size -= BLOCK_SIZE as i32;
        hops += 1;
    }
    node.size = size;
    write(img, index, &node);
    0
}

/// Returns the byte offset of the record at `index` within block 0.
fn record_offset(index: i32) -> usize {
    let index = usize::try_from(index).unwrap();
    assert!(index < INODE_COUNT);
    TABLE_OFFSET + index * RECORD_SIZE
}
