// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Operation set the kernel protocol adapter dispatches into
//!
//! Paths are given as the kernel presents them (relative to the mount root,
//! with a leading `/`). File and directory handles are the opaque `fh`
//! values returned by `open`/`opendir`.

use crate::error::FsResult;
use crate::types::{DirEntry, FileStat};
use std::ffi::{OsStr, OsString};

#[cfg_attr(test, mockall::automock)]
pub trait SysfsOps {
    fn getattr(&mut self, path: &OsStr) -> FsResult<FileStat>;

    fn readlink(&mut self, path: &OsStr) -> FsResult<OsString>;

    fn truncate(&mut self, path: &OsStr, size: u64) -> FsResult<()>;

    fn opendir(&mut self, path: &OsStr) -> FsResult<u64>;

    fn readdir(&mut self, path: &OsStr, fh: u64) -> FsResult<Vec<DirEntry>>;

    fn releasedir(&mut self, fh: u64) -> FsResult<()>;

    /// `flags` are the raw `open(2)` flags received from the kernel.
    fn open(&mut self, path: &OsStr, flags: i32) -> FsResult<u64>;

    fn read(&mut self, fh: u64, size: usize, offset: u64) -> FsResult<Vec<u8>>;

    fn write(&mut self, fh: u64, data: &[u8], offset: u64) -> FsResult<usize>;

    fn flush(&mut self, fh: u64) -> FsResult<()>;

    /// Frees the handle on every path, including when closing fails.
    fn release(&mut self, fh: u64) -> FsResult<()>;
}

impl<T: SysfsOps + ?Sized> SysfsOps for Box<T> {
    fn getattr(&mut self, path: &OsStr) -> FsResult<FileStat> {
        (**self).getattr(path)
    }

    fn readlink(&mut self, path: &OsStr) -> FsResult<OsString> {
        (**self).readlink(path)
    }

    fn truncate(&mut self, path: &OsStr, size: u64) -> FsResult<()> {
        (**self).truncate(path, size)
    }

    fn opendir(&mut self, path: &OsStr) -> FsResult<u64> {
        (**self).opendir(path)
    }

    fn readdir(&mut self, path: &OsStr, fh: u64) -> FsResult<Vec<DirEntry>> {
        (**self).readdir(path, fh)
    }

    fn releasedir(&mut self, fh: u64) -> FsResult<()> {
        (**self).releasedir(fh)
    }

    fn open(&mut self, path: &OsStr, flags: i32) -> FsResult<u64> {
        (**self).open(path, flags)
    }

    fn read(&mut self, fh: u64, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        (**self).read(fh, size, offset)
    }

    fn write(&mut self, fh: u64, data: &[u8], offset: u64) -> FsResult<usize> {
        (**self).write(fh, data, offset)
    }

    fn flush(&mut self, fh: u64) -> FsResult<()> {
        (**self).flush(fh)
    }

    fn release(&mut self, fh: u64) -> FsResult<()> {
        (**self).release(fh)
    }
}
