// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fuser adapter
//!
//! Translates inode-based kernel requests into path-based calls on a
//! [`SysfsOps`] implementation and turns results back into replies.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use crate::inodes::{child_path, InodeTable, UNKNOWN_INO};
use fuse_sysfs_core::{DirEntry, FileStat, FsError, SysfsOps};
use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyWrite, Request, TimeOrNow,
};
use libc::{c_int, EINVAL, ENOENT, ENOSYS};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Attribute and entry cache lifetime granted to the kernel
const TTL: Duration = Duration::from_secs(1);

pub struct SysfsFuse {
    ops: Box<dyn SysfsOps + Send>,
    inodes: InodeTable,
}

impl SysfsFuse {
    pub fn new(ops: Box<dyn SysfsOps + Send>) -> Self {
        Self {
            ops,
            inodes: InodeTable::new(),
        }
    }

    fn path_of(&self, ino: u64) -> Result<OsString, c_int> {
        self.inodes.path(ino).map(OsStr::to_os_string).ok_or(ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<OsString, c_int> {
        let dir = self.inodes.path(parent).ok_or(ENOENT)?;
        Ok(child_path(dir, name))
    }
}

/// errno for a failed path operation, logged on the adapter target.
fn errno(op: &'static str, path: &OsStr, err: FsError) -> c_int {
    let code = err.errno();
    debug!(target: "fuse_sysfs::fuse", op, ?path, errno = code, error = %err, "request failed");
    code
}

/// errno for a failed handle operation.
fn fh_errno(op: &'static str, fh: u64, err: FsError) -> c_int {
    let code = err.errno();
    debug!(target: "fuse_sysfs::fuse", op, fh, errno = code, error = %err, "request failed");
    code
}

/// Reply records for a listing of directory `ino` at `path`: `.` and `..`
/// first, then each name. Only inodes the kernel already knows are reused;
/// unseen names get [`UNKNOWN_INO`] and are assigned one on `lookup`.
pub fn dir_entries(
    inodes: &InodeTable,
    ino: u64,
    path: &OsStr,
    listing: Vec<DirEntry>,
) -> Vec<(u64, FileType, OsString)> {
    let parent = inodes.parent_of(ino).unwrap_or(UNKNOWN_INO);
    let mut entries = vec![
        (ino, FileType::Directory, OsString::from(".")),
        (parent, FileType::Directory, OsString::from("..")),
    ];
    for entry in listing {
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        let child = inodes.get(&child_path(path, &entry.name)).unwrap_or(UNKNOWN_INO);
        let mode = entry.stat.map(|st| st.mode).unwrap_or(entry.kind);
        entries.push((child, file_kind(mode), entry.name));
    }
    entries
}

pub fn file_kind(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

fn to_system_time(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nanos as u64)
    }
}

/// Convert a stat result into the attribute record the kernel expects.
pub fn to_file_attr(stat: &FileStat, ino: u64) -> FileAttr {
    let times = &stat.times;
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.blocks,
        atime: to_system_time(times.atime, times.atime_nsec),
        mtime: to_system_time(times.mtime, times.mtime_nsec),
        ctime: to_system_time(times.ctime, times.ctime_nsec),
        crtime: to_system_time(times.ctime, times.ctime_nsec),
        kind: file_kind(stat.mode),
        perm: stat.perm() as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: stat.rdev as u32,
        blksize: stat.blksize,
        flags: 0,
    }
}

impl fuser::Filesystem for SysfsFuse {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        info!(target: "fuse_sysfs::fuse", "session initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!(target: "fuse_sysfs::fuse", "session destroyed");
    }

    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.inodes.forget(ino);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        match self.ops.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_alloc(&path);
                reply.entry(&TTL, &to_file_attr(&stat, ino), 0);
            }
            Err(err) => reply.error(errno("lookup", &path, err)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        match self.ops.getattr(&path) {
            Ok(stat) => reply.attr(&TTL, &to_file_attr(&stat, ino)),
            Err(err) => reply.error(errno("getattr", &path, err)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        match size {
            Some(size) => {
                if let Err(err) = self.ops.truncate(&path, size) {
                    return reply.error(errno("truncate", &path, err));
                }
            }
            // chmod, chown and utimens have no counterpart in the operation set
            None if mode.is_some()
                || uid.is_some()
                || gid.is_some()
                || atime.is_some()
                || mtime.is_some() =>
            {
                return reply.error(ENOSYS);
            }
            None => {}
        }
        match self.ops.getattr(&path) {
            Ok(stat) => reply.attr(&TTL, &to_file_attr(&stat, ino)),
            Err(err) => reply.error(errno("setattr", &path, err)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        match self.ops.readlink(&path) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(err) => reply.error(errno("readlink", &path, err)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        match self.ops.open(&path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(errno("open", &path, err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(EINVAL);
        };
        match self.ops.read(fh, size as usize, offset) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(fh_errno("read", fh, err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(EINVAL);
        };
        match self.ops.write(fh, data, offset) {
            Ok(written) => reply.written(written.min(data.len()) as u32),
            Err(err) => reply.error(fh_errno("write", fh, err)),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.ops.flush(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(fh_errno("flush", fh, err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.ops.release(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(fh_errno("release", fh, err)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        match self.ops.opendir(&path) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(errno("opendir", &path, err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        let listing = match self.ops.readdir(&path, fh) {
            Ok(listing) => listing,
            Err(err) => return reply.error(errno("readdir", &path, err)),
        };
        let entries = dir_entries(&self.inodes, ino, &path, listing);

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child, kind, name)) in entries.into_iter().enumerate().skip(skip) {
            if reply.add(child, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        match self.ops.releasedir(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(fh_errno("releasedir", fh, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inodes::ROOT_INO;
    use fuse_sysfs_core::FileTimes;

    #[test]
    fn root_inode_matches_protocol() {
        assert_eq!(crate::inodes::ROOT_INO, fuser::FUSE_ROOT_ID);
    }

    #[test]
    fn file_kind_follows_type_bits() {
        assert_eq!(file_kind(libc::S_IFDIR | 0o755), FileType::Directory);
        assert_eq!(file_kind(libc::S_IFLNK | 0o777), FileType::Symlink);
        assert_eq!(file_kind(libc::S_IFREG | 0o644), FileType::RegularFile);
        assert_eq!(file_kind(0), FileType::RegularFile);
    }

    #[test]
    fn attributes_carry_stat_fields() {
        let mut stat = FileStat::synthetic(libc::S_IFREG | 0o644, 1000, 100, 4096);
        stat.times = FileTimes {
            mtime: 10,
            mtime_nsec: 5,
            ..FileTimes::default()
        };
        let attr = to_file_attr(&stat, 42);
        assert_eq!(attr.ino, 42);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        assert_eq!((attr.uid, attr.gid, attr.size, attr.nlink), (1000, 100, 4096, 1));
        assert_eq!(attr.mtime, UNIX_EPOCH + Duration::new(10, 5));
    }

    #[test]
    fn synthetic_directory_attributes() {
        let stat = FileStat::synthetic(libc::S_IFDIR | 0o755, 0, 0, 0);
        let attr = to_file_attr(&stat, 7);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.perm, 0o755);
    }

    #[test]
    fn listing_does_not_allocate_inodes() {
        let mut inodes = InodeTable::new();
        let leds = inodes.get_or_alloc(OsStr::new("/leds"));
        let kbd = inodes.get_or_alloc(OsStr::new("/leds/kbd"));
        let listed = |name: &str, kind: u32, stat: Option<FileStat>| DirEntry {
            name: OsString::from(name),
            kind,
            stat,
        };
        let listing = vec![
            listed(".", libc::S_IFDIR, None),
            listed("kbd", libc::S_IFDIR, None),
            listed("brightness", libc::S_IFREG, None),
            listed(
                "mode",
                libc::S_IFREG,
                Some(FileStat::synthetic(libc::S_IFDIR | 0o755, 0, 0, 0)),
            ),
        ];

        let entries = dir_entries(&inodes, leds, OsStr::new("/leds"), listing);
        assert_eq!(inodes.len(), 3);
        let summary: Vec<_> = entries
            .iter()
            .map(|(ino, kind, name)| (*ino, *kind, name.to_str().unwrap()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (leds, FileType::Directory, "."),
                (ROOT_INO, FileType::Directory, ".."),
                (kbd, FileType::Directory, "kbd"),
                (UNKNOWN_INO, FileType::RegularFile, "brightness"),
                (UNKNOWN_INO, FileType::Directory, "mode"),
            ]
        );
    }

    #[test]
    fn forgotten_parent_is_reported_unknown() {
        let mut inodes = InodeTable::new();
        let leds = inodes.get_or_alloc(OsStr::new("/leds"));
        let kbd = inodes.get_or_alloc(OsStr::new("/leds/kbd"));
        inodes.forget(leds);
        let entries = dir_entries(&inodes, kbd, OsStr::new("/leds/kbd"), Vec::new());
        assert_eq!(entries[1].0, UNKNOWN_INO);
    }

    #[test]
    fn negative_times_are_before_epoch() {
        assert_eq!(to_system_time(-1, 0), UNIX_EPOCH - Duration::from_secs(1));
    }
}
