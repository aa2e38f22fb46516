// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The overlay: a real backing directory with virtual entries on top
//!
//! All passthrough syscalls are issued relative to one directory descriptor
//! opened at construction and held until the overlay is dropped. Dispatch
//! is single-threaded; `&mut self` on every operation reflects that.

use crate::dir::{self, SYNTHETIC_DIR_MODE};
use crate::entry::{EntryRegistry, VirtualEntry};
use crate::error::{FsError, FsResult};
use crate::handle::{DirHandle, FileHandle, HandleTable, VirtualHandle};
use crate::ops::SysfsOps;
use crate::path::{classify, normalize, PathClass};
use crate::types::{DirEntry, FileStat};
use nix::dir::Dir;
use nix::errno::Errno;
use nix::fcntl::{readlinkat, AtFlags, OFlag};
use nix::sys::stat::{fstatat, Mode};
use std::ffi::{OsStr, OsString};
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Flags for every descriptor opened against the backing tree
fn base_flags() -> OFlag {
    OFlag::O_NOFOLLOW | OFlag::O_NOCTTY | OFlag::O_CLOEXEC
}

pub struct OverlayFs {
    root: OwnedFd,
    registry: EntryRegistry,
    files: HandleTable<FileHandle>,
    dirs: HandleTable<DirHandle>,
}

impl OverlayFs {
    /// Open `backing_dir` and prepare the virtual entry table.
    pub fn new(backing_dir: &Path, entries: Vec<VirtualEntry>) -> FsResult<Self> {
        let root = nix::fcntl::open(
            backing_dir,
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | base_flags(),
            Mode::empty(),
        )?;
        let overlay = Self::with_root(root, entries)?;
        info!(
            target: "fuse_sysfs::overlay",
            backing_dir = %backing_dir.display(),
            virtual_entries = overlay.registry.len(),
            "overlay ready"
        );
        Ok(overlay)
    }

    /// Build the overlay over an already opened directory descriptor.
    pub fn with_root(root: OwnedFd, entries: Vec<VirtualEntry>) -> FsResult<Self> {
        Ok(Self {
            root,
            registry: EntryRegistry::prepare(entries)?,
            files: HandleTable::new(),
            dirs: HandleTable::new(),
        })
    }

    pub fn registry(&self) -> &EntryRegistry {
        &self.registry
    }

    /// Number of open file handles
    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    /// Number of open directory handles
    pub fn open_dirs(&self) -> usize {
        self.dirs.len()
    }

    fn stat_real(&self, path: &OsStr) -> FsResult<FileStat> {
        let stat = fstatat(&self.root, path, AtFlags::AT_SYMLINK_NOFOLLOW).map_err(lookup_error)?;
        Ok(stat.into())
    }

    fn is_virtual(&self, path: &OsStr) -> bool {
        matches!(classify(&self.registry, path), PathClass::Virtual(_))
    }
}

/// A path that is neither virtual nor present in the backing tree is
/// reported as [`FsError::NotFound`].
fn lookup_error(err: Errno) -> FsError {
    match err {
        Errno::ENOENT => FsError::NotFound,
        other => other.into(),
    }
}

impl SysfsOps for OverlayFs {
    fn getattr(&mut self, path: &OsStr) -> FsResult<FileStat> {
        let path = normalize(path);
        match classify(&self.registry, path) {
            PathClass::Virtual(entry) => Ok(entry.stat()),
            PathClass::ImpliedDir => match self.stat_real(path) {
                Err(FsError::NotFound) => Ok(FileStat::synthetic(SYNTHETIC_DIR_MODE, 0, 0, 0)),
                other => other,
            },
            PathClass::Passthrough => self.stat_real(path),
        }
    }

    fn readlink(&mut self, path: &OsStr) -> FsResult<OsString> {
        let path = normalize(path);
        if self.is_virtual(path) {
            return Err(FsError::InvalidArgument);
        }
        readlinkat(&self.root, path).map_err(lookup_error)
    }

    fn truncate(&mut self, path: &OsStr, size: u64) -> FsResult<()> {
        let path = normalize(path);
        if self.is_virtual(path) {
            return Ok(());
        }
        let size = i64::try_from(size).map_err(|_| FsError::InvalidArgument)?;
        let fd = nix::fcntl::openat(
            &self.root,
            path,
            OFlag::O_WRONLY | base_flags(),
            Mode::empty(),
        )
        .map_err(lookup_error)?;
        nix::unistd::ftruncate(&fd, size)?;
        Ok(())
    }

    fn opendir(&mut self, path: &OsStr) -> FsResult<u64> {
        let path = normalize(path);
        let handle = match Dir::openat(
            &self.root,
            path,
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | base_flags(),
            Mode::empty(),
        ) {
            Ok(dir) => DirHandle::Real(dir),
            Err(err) => match classify(&self.registry, path) {
                PathClass::Virtual(_) | PathClass::ImpliedDir => {
                    debug!(
                        target: "fuse_sysfs::overlay",
                        ?path,
                        %err,
                        "no backing directory; using synthetic handle"
                    );
                    DirHandle::Synthetic
                }
                PathClass::Passthrough => return Err(lookup_error(err)),
            },
        };
        Ok(self.dirs.insert(handle))
    }

    fn readdir(&mut self, path: &OsStr, fh: u64) -> FsResult<Vec<DirEntry>> {
        let path = normalize(path);
        let handle = self.dirs.get_mut(fh)?;
        dir::list(&self.registry, path, handle)
    }

    fn releasedir(&mut self, fh: u64) -> FsResult<()> {
        // Dropping the stream closes it; synthetic handles own nothing.
        self.dirs.remove(fh).map(drop)
    }

    fn open(&mut self, path: &OsStr, flags: i32) -> FsResult<u64> {
        let path = normalize(path);
        let handle = match classify(&self.registry, path) {
            PathClass::Virtual(entry) => FileHandle::Virtual(VirtualHandle::new(Arc::clone(entry))),
            class => {
                let mut oflag = OFlag::from_bits_truncate(flags) | base_flags();
                oflag.remove(OFlag::O_CREAT | OFlag::O_NONBLOCK);
                match nix::fcntl::openat(&self.root, path, oflag, Mode::empty()) {
                    Ok(fd) => FileHandle::Real(fd),
                    Err(Errno::ENOENT) if matches!(class, PathClass::ImpliedDir) => {
                        return Err(FsError::IsADirectory)
                    }
                    Err(err) => return Err(lookup_error(err)),
                }
            }
        };
        Ok(self.files.insert(handle))
    }

    fn read(&mut self, fh: u64, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        self.files.get_mut(fh)?.read(size, offset)
    }

    fn write(&mut self, fh: u64, data: &[u8], offset: u64) -> FsResult<usize> {
        self.files.get_mut(fh)?.write(data, offset)
    }

    fn flush(&mut self, fh: u64) -> FsResult<()> {
        self.files.get_mut(fh)?.flush()
    }

    fn release(&mut self, fh: u64) -> FsResult<()> {
        // Removed from the table first: the handle is gone even if close fails.
        self.files.remove(fh)?.close()
    }
}
