// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dispatch decorator logging every operation and its outcome
//!
//! Wraps any [`SysfsOps`] implementation; results and error codes pass
//! through untouched.

use crate::error::FsResult;
use crate::ops::SysfsOps;
use crate::types::{DirEntry, FileStat};
use std::ffi::{OsStr, OsString};
use std::fmt::Debug;
use tracing::debug;

pub struct Traced<T> {
    inner: T,
}

impl<T: SysfsOps> Traced<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

/// Log `result` of operation `op` and hand it back unchanged.
fn outcome<R, S: Debug>(
    op: &'static str,
    result: FsResult<R>,
    summary: impl FnOnce(&R) -> S,
) -> FsResult<R> {
    match &result {
        Ok(value) => debug!(target: "fuse_sysfs::trace", op, result = ?summary(value), "ok"),
        Err(err) => debug!(
            target: "fuse_sysfs::trace",
            op,
            errno = err.errno(),
            error = %err,
            "failed"
        ),
    }
    result
}

impl<T: SysfsOps> SysfsOps for Traced<T> {
    fn getattr(&mut self, path: &OsStr) -> FsResult<FileStat> {
        debug!(target: "fuse_sysfs::trace", op = "getattr", ?path);
        outcome("getattr", self.inner.getattr(path), |st| {
            format!("mode={:#o} size={}", st.mode, st.size)
        })
    }

    fn readlink(&mut self, path: &OsStr) -> FsResult<OsString> {
        debug!(target: "fuse_sysfs::trace", op = "readlink", ?path);
        outcome("readlink", self.inner.readlink(path), |target| target.clone())
    }

    fn truncate(&mut self, path: &OsStr, size: u64) -> FsResult<()> {
        debug!(target: "fuse_sysfs::trace", op = "truncate", ?path, size);
        outcome("truncate", self.inner.truncate(path, size), |_| ())
    }

    fn opendir(&mut self, path: &OsStr) -> FsResult<u64> {
        debug!(target: "fuse_sysfs::trace", op = "opendir", ?path);
        outcome("opendir", self.inner.opendir(path), |fh| *fh)
    }

    fn readdir(&mut self, path: &OsStr, fh: u64) -> FsResult<Vec<DirEntry>> {
        debug!(target: "fuse_sysfs::trace", op = "readdir", ?path, fh);
        outcome("readdir", self.inner.readdir(path, fh), |entries| entries.len())
    }

    fn releasedir(&mut self, fh: u64) -> FsResult<()> {
        debug!(target: "fuse_sysfs::trace", op = "releasedir", fh);
        outcome("releasedir", self.inner.releasedir(fh), |_| ())
    }

    fn open(&mut self, path: &OsStr, flags: i32) -> FsResult<u64> {
        debug!(
            target: "fuse_sysfs::trace",
            op = "open",
            ?path,
            flags = format_args!("{flags:#x}")
        );
        outcome("open", self.inner.open(path, flags), |fh| *fh)
    }

    fn read(&mut self, fh: u64, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        debug!(target: "fuse_sysfs::trace", op = "pread", fh, size, offset);
        outcome("pread", self.inner.read(fh, size, offset), |data| data.len())
    }

    fn write(&mut self, fh: u64, data: &[u8], offset: u64) -> FsResult<usize> {
        debug!(target: "fuse_sysfs::trace", op = "pwrite", fh, size = data.len(), offset);
        outcome("pwrite", self.inner.write(fh, data, offset), |n| *n)
    }

    fn flush(&mut self, fh: u64) -> FsResult<()> {
        debug!(target: "fuse_sysfs::trace", op = "flush", fh);
        outcome("flush", self.inner.flush(fh), |_| ())
    }

    fn release(&mut self, fh: u64) -> FsResult<()> {
        debug!(target: "fuse_sysfs::trace", op = "close", fh);
        outcome("close", self.inner.release(fh), |_| ())
    }
}
