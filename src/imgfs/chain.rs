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

//! The chain pool: block 1 as a dense array of `(block, next)` nodes.
//!
//! Each inode owns a singly-linked list of chain nodes naming its data blocks
//! in order, head node first. Links are indices into this pool; `next == 0`
//! terminates a chain and a node with `block == 0` is free.

use crate::image::Image;
use crate::BLOCK_SIZE;

/// The size of a chain node on disk in bytes.
pub const NODE_SIZE: usize = 8;
/// The number of chain nodes fitting in the pool block.
pub const NODE_COUNT: usize = BLOCK_SIZE / NODE_SIZE;

/// One cell of the per-inode block chains.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChainNode {
    /// The index of the data block this node names. `0` marks the node free.
    pub block: i32,
    /// The pool index of the next node of the chain, `0` for the last one.
    pub next: i32,
}

/// Reads the chain node at `index`.
pub fn read(img: &Image, index: i32) -> ChainNode {
    let off = node_offset(index);
    let pool = img.block(1);
    ChainNode {
        block: i32::from_le_bytes(pool[off..off + 4].try_into().unwrap()),
        next: i32::from_le_bytes(pool[off + 4..off + 8].try_into().unwrap()),
    }
}

/// Writes the chain node at `index`.
pub fn write(img: &mut Image, index: i32, node: &ChainNode) {
    let off = node_offset(index);
    let pool = img.block_mut(1);
    pool[off..off + 4].copy_from_slice(&node.block.to_le_bytes());
    pool[off + 4..off + 8].copy_from_slice(&node.next.to_le_bytes());
}

/// Claims the first free node of the pool, binds a freshly allocated data
/// block to it and returns its index, or `-1` when every node is taken.
///
/// The node keeps whatever `alloc_block` returned, so running the data pool
/// dry leaves the claimed node with a negative block index.
pub fn alloc(img: &mut Image) -> i32 {
    for i in 0..NODE_COUNT {
        let mut node = read(img, i as i32);
        if node.block == 0 {
            node.block = img.alloc_block();
            write(img, i as i32, &node);
            return i as i32;
        }
    }
    -1
}

/// Returns the byte offset of the node at `index` within the pool block.
fn node_offset(index: i32) -> usize {
    let index = usize::try_from(index).unwrap();
    assert!(index < NODE_COUNT);
    index * NODE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_round_trip() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let mut img = Image::open(&path).unwrap();
        let node = ChainNode { block: 7, next: 3 };
        write(&mut img, 5, &node);
        assert_eq!(read(&img, 5), node);
        assert_eq!(read(&img, 4), ChainNode::default());
    }

    #[test]
    fn alloc_claims_first_free_node_and_a_block() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let mut img = Image::open(&path).unwrap();
        let first = alloc(&mut img);
        let second = alloc(&mut img);
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        // data blocks handed out in pool order, right after the reserved two
        assert_eq!(read(&img, 0), ChainNode { block: 2, next: 0 });
        assert_eq!(read(&img, 1), ChainNode { block: 3, next: 0 });
    }
}
