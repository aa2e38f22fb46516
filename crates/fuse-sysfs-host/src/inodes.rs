// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inode numbers handed to the kernel, and the paths they stand for

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

/// Inode of the mount root (same value as `fuser::FUSE_ROOT_ID`)
pub const ROOT_INO: u64 = 1;

/// Directory-entry inode for names the kernel has not looked up yet
/// (libfuse's `FUSE_UNKNOWN_INO`).
pub const UNKNOWN_INO: u64 = 0xffff_ffff;

/// Bidirectional inode <-> path map. Paths are kept in kernel form:
/// absolute, `/`-separated, root is `/`.
///
/// Entries are only created by `lookup` and dropped by `forget`, so the
/// table tracks what the kernel holds references to.
#[derive(Debug)]
pub struct InodeTable {
    inodes: HashMap<u64, OsString>,
    paths: HashMap<OsString, u64>,
    next_inode: u64,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut inodes = HashMap::new();
        let mut paths = HashMap::new();
        inodes.insert(ROOT_INO, OsString::from("/"));
        paths.insert(OsString::from("/"), ROOT_INO);
        Self {
            inodes,
            paths,
            next_inode: ROOT_INO + 1,
        }
    }

    pub fn path(&self, ino: u64) -> Option<&OsStr> {
        self.inodes.get(&ino).map(OsString::as_os_str)
    }

    /// Inode already assigned to `path`, if any.
    pub fn get(&self, path: &OsStr) -> Option<u64> {
        self.paths.get(path).copied()
    }

    /// Inode for `path`, allocating one on first sight.
    pub fn get_or_alloc(&mut self, path: &OsStr) -> u64 {
        if let Some(ino) = self.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.paths.insert(path.to_os_string(), ino);
        self.inodes.insert(ino, path.to_os_string());
        ino
    }

    /// Drop the mapping for `ino`. The root is never forgotten.
    pub fn forget(&mut self, ino: u64) {
        if ino == ROOT_INO {
            return;
        }
        if let Some(path) = self.inodes.remove(&ino) {
            self.paths.remove(&path);
        }
    }

    /// Inode of the directory containing `ino`, if that directory is known.
    /// The root is its own parent.
    pub fn parent_of(&self, ino: u64) -> Option<u64> {
        self.get(parent_path(self.path(ino)?))
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Path of entry `name` inside directory `dir`.
pub fn child_path(dir: &OsStr, name: &OsStr) -> OsString {
    let mut path = OsString::with_capacity(dir.len() + 1 + name.len());
    path.push(dir);
    if dir.as_bytes() != b"/" {
        path.push("/");
    }
    path.push(name);
    path
}

pub fn parent_path(path: &OsStr) -> &OsStr {
    let bytes = path.as_bytes();
    match bytes.iter().rposition(|&b| b == b'/') {
        Some(0) | None => OsStr::new("/"),
        Some(pos) => OsStr::from_bytes(&bytes[..pos]),
    }
}
