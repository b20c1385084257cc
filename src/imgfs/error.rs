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

//! Errors surfaced by the filesystem operations.

use thiserror::Error;

/// An error returned by a filesystem operation.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum FsError {
    /// The path does not name an existing object.
    #[error("no such file or directory")]
    NotFound,
    /// The inode table has no free slot left.
    #[error("out of inodes")]
    InodesExhausted,
    /// The parent directory of the path could not be resolved.
    #[error("parent directory not found")]
    ParentMissing,
    /// The target is not an empty directory with the expected mode.
    #[error("directory not empty or not removable")]
    NotRemovable,
}

impl FsError {
    /// The errno this error surfaces as across the kernel bridge.
    ///
    /// Only a missing object is distinguished; every other failure maps to the
    /// same generic code.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            _ => libc::EPERM,
        }
    }
}
