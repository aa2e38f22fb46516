// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Attribute and directory-entry types shared by the engine and its hosts

use libc::{S_IFDIR, S_IFLNK, S_IFMT};
use std::ffi::OsString;

/// File timestamps (seconds + nanoseconds since the epoch)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub atime: i64,
    pub atime_nsec: u32,
    pub mtime: i64,
    pub mtime_nsec: u32,
    pub ctime: i64,
    pub ctime_nsec: u32,
}

/// Attributes reported for a path, either taken from the backing
/// directory or synthesized from a virtual entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStat {
    pub ino: u64,
    /// File type and permission bits (`S_IFMT | perm`)
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
    pub rdev: u64,
    pub times: FileTimes,
}

impl FileStat {
    /// Synthesized attributes: only type, ownership and size are meaningful.
    pub fn synthetic(mode: u32, uid: u32, gid: u32, size: u64) -> Self {
        Self {
            mode,
            nlink: if mode & S_IFMT == S_IFDIR { 2 } else { 1 },
            uid,
            gid,
            size,
            blksize: 512,
            ..Default::default()
        }
    }

    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }
}

impl From<nix::sys::stat::FileStat> for FileStat {
    #[allow(clippy::unnecessary_cast)]
    fn from(st: nix::sys::stat::FileStat) -> Self {
        Self {
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u32,
            uid: st.st_uid,
            gid: st.st_gid,
            size: st.st_size.max(0) as u64,
            blocks: st.st_blocks.max(0) as u64,
            blksize: st.st_blksize.max(0) as u32,
            rdev: st.st_rdev as u64,
            times: FileTimes {
                atime: st.st_atime as i64,
                atime_nsec: st.st_atime_nsec.max(0) as u32,
                mtime: st.st_mtime as i64,
                mtime_nsec: st.st_mtime_nsec.max(0) as u32,
                ctime: st.st_ctime as i64,
                ctime_nsec: st.st_ctime_nsec.max(0) as u32,
            },
        }
    }
}

/// One name produced by a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    /// `S_IF*` type bits when known, 0 otherwise
    pub kind: u32,
    /// Attributes, present for virtual entries only
    pub stat: Option<FileStat>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::S_IFREG;

    #[test]
    fn synthetic_stat_counts_links_by_type() {
        let file = FileStat::synthetic(S_IFREG | 0o644, 1000, 1000, 4096);
        assert_eq!(file.nlink, 1);
        assert_eq!(file.perm(), 0o644);
        assert!(!file.is_dir());

        let dir = FileStat::synthetic(S_IFDIR | 0o755, 0, 0, 0);
        assert_eq!(dir.nlink, 2);
        assert!(dir.is_dir());
    }
}
