//! Directory content and path resolution.
//!
//! A directory stores its entries in the first data block of its chain, as a
//! packed array of fixed-width records. Paths are absolute, `/`-separated and
//! resolved one component per directory lookup starting from inode 0.

use crate::chain;
use crate::image::Image;
use crate::inode;
use crate::inode::Inode;
use crate::BLOCK_SIZE;
use std::str;

/// The maximum length of an entry name in bytes, terminator included.
pub const NAME_LEN: usize = 48;
/// The size of a directory entry on disk in bytes.
pub const ENTRY_SIZE: usize = 64;
/// The number of entries fitting in a directory's content block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;

/// The mode the root directory is created with.
pub const ROOT_MODE: i32 = 0o040775;

/// A directory entry binding a name to an inode index.
#[derive(Clone, Debug)]
pub struct DirEntry {
    /// The null-padded name bytes.
    pub name: [u8; NAME_LEN],
    /// The index of the named inode. `0` marks the slot free.
    pub inum: i32,
}

impl DirEntry {
    /// An empty slot.
    fn cleared() -> Self {
        Self {
            name: [0; NAME_LEN],
            inum: 0,
        }
    }

    /// Returns the stored name, up to its first null byte.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

/// Reads the entry in `slot` of a directory content block.
fn read_entry(block: &[u8], slot: usize) -> DirEntry {
    let off = slot * ENTRY_SIZE;
    let mut name = [0u8; NAME_LEN];
    name.copy_from_slice(&block[off..off + NAME_LEN]);
    let inum = i32::from_le_bytes(block[off + NAME_LEN..off + NAME_LEN + 4].try_into().unwrap());
    DirEntry { name, inum }
}

/// Writes `entry` into `slot` of a directory content block.
fn write_entry(block: &mut [u8], slot: usize, entry: &DirEntry) {
    let off = slot * ENTRY_SIZE;
    block[off..off + NAME_LEN].copy_from_slice(&entry.name);
    block[off + NAME_LEN..off + NAME_LEN + 4].copy_from_slice(&entry.inum.to_le_bytes());
}

/// Returns the index of the data block holding the entries of `dir`.
fn content_block(img: &Image, dir: &Inode) -> i32 {
    chain::read(img, dir.head_chain).block
}

/// Splits `path` on `/` into its components.
///
/// An absolute path yields a leading empty component; a single trailing slash
/// is dropped.
pub fn split_path(path: &str) -> Vec<String> {
    let mut parts: Vec<String> = path.split('/').map(str::to_owned).collect();
    if path.ends_with('/') {
        parts.pop();
    }
    parts
}

/// Returns the final component of `path`.
pub fn filename(path: &str) -> String {
    split_path(path).pop().unwrap_or_default()
}

/// Sets up inode 0 as the empty root directory, with one content block ready
/// for entries. Returns the root's index.
pub fn init_root(img: &mut Image) -> i32 {
    let root = inode::alloc(img);
    let node = Inode {
        refs: 1,
        mode: ROOT_MODE,
        size: 0,
        head_chain: chain::alloc(img),
    };
    inode::write(img, root, &node);
    root
}

/// Looks `name` up in the directory `dir` and returns the matching inode
/// index, or `-1` on a miss.
///
/// The exact name `"/"` is the root base case. Every slot of the content block
/// is compared byte-for-byte, free ones included, so an empty `name` matches
/// the first free slot and yields inode 0 whenever the directory has one.
pub fn find_file_in_dir(img: &Image, dir: &Inode, name: &str) -> i32 {
    if name == "/" {
        return 0;
    }
    let block = img.block(content_block(img, dir));
    for slot in 0..ENTRIES_PER_BLOCK {
        let entry = read_entry(block, slot);
        if entry.name_str() == name {
            return entry.inum;
        }
    }
    -1
}

/// Resolves every component of `path` and returns its inode index, or `-1`.
pub fn find_inode_index(img: &Image, path: &str) -> i32 {
    let mut index = 0;
    for part in split_path(path) {
        if index < 0 {
            return -1;
        }
        index = find_file_in_dir(img, &inode::read(img, index), &part);
    }
    index
}

/// Resolves `path` up to, but not including, its final component, and returns
/// the inode index of the containing directory, or `-1`.
pub fn parent_inode_index(img: &Image, path: &str) -> i32 {
    let parts = split_path(path);
    let mut index = 0;
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        if index < 0 {
            return -1;
        }
        index = find_file_in_dir(img, &inode::read(img, index), part);
    }
    index
}

/// Binds `name` to the inode `inum` in the first free slot of the directory at
/// `dir_index`.
///
/// Increments the child's link count and grows the directory's size counter by
/// one entry. Returns `inum`, or `-1` when every slot is taken.
pub fn put(img: &mut Image, dir_index: i32, name: &str, inum: i32) -> i32 {
    let dir = inode::read(img, dir_index);
    let block_index = content_block(img, &dir);
    for slot in 0..ENTRIES_PER_BLOCK {
        let entry = read_entry(img.block(block_index), slot);
        if entry.inum == 0 {
            let mut child = inode::read(img, inum);
            child.refs += 1;
            inode::write(img, inum, &child);

            let mut entry = DirEntry::cleared();
            entry.inum = inum;
            let bytes = name.as_bytes();
            let len = bytes.len().min(NAME_LEN - 1);
            entry.name[..len].copy_from_slice(&bytes[..len]);
            write_entry(img.block_mut(block_index), slot, &entry);

            let mut dir = inode::read(img, dir_index);
            dir.size += ENTRY_SIZE as i32;
            inode::write(img, dir_index, &dir);
            return inum;
        }
    }
    -1
}

/// Unbinds the entry for `path` from the directory at `dir_index`.
///
/// The child's link count drops first; the child inode is freed once the count
/// falls below one. The slot is cleared but the directory's size counter is
/// left as is. Returns the child's index, or `-1` when no entry matches.
pub fn delete(img: &mut Image, dir_index: i32, path: &str) -> i32 {
    let inum = find_inode_index(img, path);
    if inum < 0 {
        return -1;
    }
    let name = filename(path);
    let mut child = inode::read(img, inum);
    child.refs -= 1;
    inode::write(img, inum, &child);

    let dir = inode::read(img, dir_index);
    let block_index = content_block(img, &dir);
    for slot in 0..ENTRIES_PER_BLOCK {
        let entry = read_entry(img.block(block_index), slot);
        if entry.inum == inum && entry.name_str() == name {
            if inode::read(img, inum).refs < 1 {
                inode::free(img, inum);
            }
            write_entry(img.block_mut(block_index), slot, &DirEntry::cleared());
            return inum;
        }
    }
    -1
}

/// Lists the non-empty entry names of the directory at `path`, in slot order.
///
/// `path` must name an existing directory. The iteration range follows the
/// directory's size counter, which counts insertions and never shrinks, so
/// cleared slots show up in the range and are filtered by name.
pub fn list(img: &Image, path: &str) -> Vec<String> {
    let index = find_inode_index(img, path);
    let dir = inode::read(img, index);
    let block = img.block(content_block(img, &dir));
    let count = (dir.size as usize / ENTRY_SIZE).min(ENTRIES_PER_BLOCK);
    (0..count)
        .map(|slot| read_entry(block, slot))
        .filter(|entry| !entry.name_str().is_empty())
        .map(|entry| entry.name_str().to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_root() -> (tempfile::TempPath, Image) {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let mut img = Image::open(&path).unwrap();
        init_root(&mut img);
        (path, img)
    }

    fn new_file(img: &mut Image, mode: i32) -> i32 {
        let index = inode::alloc(img);
        let node = Inode {
            refs: 1,
            mode,
            size: 0,
            head_chain: chain::alloc(img),
        };
        inode::write(img, index, &node);
        index
    }

    #[test]
    fn split_keeps_leading_and_drops_trailing_empty() {
        assert_eq!(split_path("/"), vec![""]);
        assert_eq!(split_path("/a"), vec!["", "a"]);
        assert_eq!(split_path("/a/b"), vec!["", "a", "b"]);
        assert_eq!(split_path("/a/"), vec!["", "a"]);
    }

    #[test]
    fn filename_is_the_tail_component() {
        assert_eq!(filename("/a"), "a");
        assert_eq!(filename("/a/b"), "b");
        assert_eq!(filename("/"), "");
    }

    #[test]
    fn init_root_claims_inode_zero() {
        let (_path, img) = fresh_root();
        let root = inode::read(&img, 0);
        assert_eq!(root.refs, 1);
        assert_eq!(root.mode, ROOT_MODE);
        assert_eq!(root.size, 0);
        // the root's content block is the first of the data pool
        assert_eq!(chain::read(&img, root.head_chain).block, 2);
    }

    #[test]
    fn put_then_find() {
        let (_path, mut img) = fresh_root();
        let file = new_file(&mut img, 0o100644);
        assert_eq!(put(&mut img, 0, "hello", file), file);
        let root = inode::read(&img, 0);
        assert_eq!(find_file_in_dir(&img, &root, "hello"), file);
        assert_eq!(find_file_in_dir(&img, &root, "other"), -1);
        assert_eq!(root.size, ENTRY_SIZE as i32);
        // one put, one creation refcount
        assert_eq!(inode::read(&img, file).refs, 2);
    }

    #[test]
    fn empty_name_matches_the_first_free_slot() {
        let (_path, img) = fresh_root();
        let root = inode::read(&img, 0);
        assert_eq!(find_file_in_dir(&img, &root, ""), 0);
        assert_eq!(find_inode_index(&img, "/"), 0);
    }

    #[test]
    fn resolver_walks_nested_directories() {
        let (_path, mut img) = fresh_root();
        let dir = new_file(&mut img, ROOT_MODE);
        put(&mut img, 0, "d", dir);
        let file = new_file(&mut img, 0o100644);
        put(&mut img, dir, "x", file);
        assert_eq!(find_inode_index(&img, "/d"), dir);
        assert_eq!(find_inode_index(&img, "/d/x"), file);
        assert_eq!(parent_inode_index(&img, "/d/x"), dir);
        assert_eq!(find_inode_index(&img, "/nope"), -1);
        assert_eq!(find_inode_index(&img, "/nope/x"), -1);
    }

    #[test]
    fn delete_clears_the_slot_but_not_the_size() {
        let (_path, mut img) = fresh_root();
        let file = new_file(&mut img, 0o100644);
        put(&mut img, 0, "a", file);
        assert_eq!(delete(&mut img, 0, "/a"), file);
        assert_eq!(find_inode_index(&img, "/a"), -1);
        assert_eq!(inode::read(&img, 0).size, ENTRY_SIZE as i32);
        // one link dropped, the creation count remains
        assert_eq!(inode::read(&img, file).refs, 1);
        assert!(crate::bitmap::get(img.inode_bitmap(), file as usize));
    }

    #[test]
    fn list_reuses_cleared_slots_range() {
        let (_path, mut img) = fresh_root();
        let a = new_file(&mut img, 0o100644);
        let b = new_file(&mut img, 0o100644);
        put(&mut img, 0, "a", a);
        put(&mut img, 0, "b", b);
        delete(&mut img, 0, "/a");
        assert_eq!(list(&img, "/"), vec!["b"]);
        let c = new_file(&mut img, 0o100644);
        put(&mut img, 0, "c", c);
        // the new entry lands in the cleared slot, the size counter keeps growing
        assert_eq!(list(&img, "/"), vec!["c", "b"]);
        assert_eq!(inode::read(&img, 0).size, 3 * ENTRY_SIZE as i32);
    }
}
