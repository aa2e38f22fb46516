// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-open file and directory state
//!
//! Every open descriptor is backed either by a raw descriptor opened
//! relative to the backing directory, or by a virtual entry plus an
//! optional buffer. Handles live in a [`HandleTable`] keyed by the opaque
//! `fh` value handed to the kernel and are dropped exactly once, on release.

use crate::buffer::GrowBuffer;
use crate::entry::VirtualEntry;
use crate::error::{FsError, FsResult};
use nix::dir::Dir;
use nix::sys::uio::{pread, pwrite};
use nix::unistd::close;
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::Arc;

/// State of one open file
#[derive(Debug)]
pub enum FileHandle {
    /// Passthrough to a real file under the backing directory
    Real(OwnedFd),
    /// Served by a virtual entry's callbacks
    Virtual(VirtualHandle),
}

#[derive(Debug)]
pub struct VirtualHandle {
    entry: Arc<VirtualEntry>,
    buffer: Option<GrowBuffer>,
    write_pending: bool,
}

impl VirtualHandle {
    pub fn new(entry: Arc<VirtualEntry>) -> Self {
        Self {
            entry,
            buffer: None,
            write_pending: false,
        }
    }

    pub fn is_write_pending(&self) -> bool {
        self.write_pending
    }

    pub fn buffered(&self) -> Option<&[u8]> {
        self.buffer.as_ref().map(GrowBuffer::as_slice)
    }

    fn read(&mut self, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        if !self.entry.is_readable() {
            return Err(FsError::Unsupported);
        }
        let buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => GrowBuffer::from_vec(self.entry.read_content()?),
        };
        let buffer = self.buffer.insert(buffer);
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(buffer.read_at(offset, size).to_vec())
    }

    fn write(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        if !self.entry.is_writable() {
            return Err(FsError::Unsupported);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if !self.entry.is_write_merge() {
            return self.entry.write_content(data);
        }
        let offset = usize::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        self.buffer.get_or_insert_with(GrowBuffer::new).write_at(offset, data)?;
        self.write_pending = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> FsResult<()> {
        if !self.write_pending {
            return Ok(());
        }
        // Cleared before delivery so a failing callback is not re-invoked
        // by the flush that accompanies every close.
        self.write_pending = false;
        let content = self.buffer.as_ref().map(GrowBuffer::as_slice).unwrap_or_default();
        self.entry.write_content(content).map(|_| ())
    }
}

impl FileHandle {
    /// Positioned read of at most `size` bytes.
    pub fn read(&mut self, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        match self {
            FileHandle::Real(fd) => {
                let offset = i64::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
                let mut buf = Vec::new();
                buf.try_reserve_exact(size)?;
                buf.resize(size, 0);
                let n = pread(&*fd, &mut buf, offset)?;
                buf.truncate(n);
                Ok(buf)
            }
            FileHandle::Virtual(handle) => handle.read(size, offset),
        }
    }

    /// Positioned write; returns the number of bytes accepted.
    pub fn write(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        match self {
            FileHandle::Real(fd) => {
                let offset = i64::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
                Ok(pwrite(&*fd, data, offset)?)
            }
            FileHandle::Virtual(handle) => handle.write(data, offset),
        }
    }

    /// Deliver a pending merged write. No-op for everything else.
    pub fn flush(&mut self) -> FsResult<()> {
        match self {
            FileHandle::Real(_) => Ok(()),
            FileHandle::Virtual(handle) => handle.flush(),
        }
    }

    /// Consume the handle, closing the raw descriptor if there is one.
    pub fn close(self) -> FsResult<()> {
        match self {
            FileHandle::Real(fd) => Ok(close(fd)?),
            FileHandle::Virtual(_) => Ok(()),
        }
    }
}

/// State of one open directory
#[derive(Debug)]
pub enum DirHandle {
    /// Real directory stream under the backing directory
    Real(Dir),
    /// Directory that exists only because virtual entries live under it
    Synthetic,
}

/// Open handles keyed by the `fh` value given to the kernel
#[derive(Debug)]
pub struct HandleTable<H> {
    handles: HashMap<u64, H>,
    next_fh: u64,
}

impl<H> Default for HandleTable<H> {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
            next_fh: 1,
        }
    }
}

impl<H> HandleTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: H) -> u64 {
        let fh = self.next_fh;
        self.next_fh = self.next_fh.wrapping_add(1).max(1);
        self.handles.insert(fh, handle);
        fh
    }

    pub fn get_mut(&mut self, fh: u64) -> FsResult<&mut H> {
        self.handles.get_mut(&fh).ok_or(FsError::BadFileDescriptor)
    }

    /// Take ownership of the handle; a second removal fails with `EBADF`.
    pub fn remove(&mut self, fh: u64) -> FsResult<H> {
        self.handles.remove(&fh).ok_or(FsError::BadFileDescriptor)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::S_IFREG;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<Vec<u8>>>>;

    fn recording_entry(merge: bool) -> (Arc<VirtualEntry>, Log) {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let entry = VirtualEntry::new("brightness", S_IFREG | 0o644)
            .on_read(|_| Ok(b"30000\n".to_vec()))
            .on_write(move |_, data| {
                sink.lock().unwrap().push(data.to_vec());
                Ok(data.len())
            })
            .write_merge(merge);
        (Arc::new(entry), log)
    }

    #[test]
    fn merged_writes_are_delivered_once_on_flush() {
        let (entry, log) = recording_entry(true);
        let mut handle = FileHandle::Virtual(VirtualHandle::new(entry));

        assert_eq!(handle.write(b"abcd", 0).unwrap(), 4);
        assert_eq!(handle.write(b"wxyz", 10).unwrap(), 4);
        assert!(log.lock().unwrap().is_empty());

        handle.flush().unwrap();
        handle.flush().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        let delivered = &log[0];
        assert_eq!(delivered.len(), 14);
        assert_eq!(&delivered[..4], b"abcd");
        assert!(delivered[4..10].iter().all(|b| *b == 0));
        assert_eq!(&delivered[10..], b"wxyz");
    }

    #[test]
    fn immediate_writes_are_forwarded_per_call() {
        let (entry, log) = recording_entry(false);
        let mut handle = FileHandle::Virtual(VirtualHandle::new(entry));

        handle.write(b"12", 0).unwrap();
        handle.write(b"34", 2).unwrap();
        handle.flush().unwrap();

        assert_eq!(*log.lock().unwrap(), vec![b"12".to_vec(), b"34".to_vec()]);
    }

    #[test]
    fn zero_length_write_is_a_successful_noop() {
        let (entry, log) = recording_entry(true);
        let mut handle = VirtualHandle::new(entry);
        assert_eq!(handle.write(b"", 7).unwrap(), 0);
        assert!(!handle.is_write_pending());
        assert!(handle.buffered().is_none());
        handle.flush().unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn read_materializes_once_and_clips() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let entry = VirtualEntry::new("max_brightness", S_IFREG | 0o444).on_read(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(b"65535\n".to_vec())
        });
        let mut handle = FileHandle::Virtual(VirtualHandle::new(Arc::new(entry)));

        assert_eq!(handle.read(3, 0).unwrap(), b"655");
        assert_eq!(handle.read(100, 3).unwrap(), b"35\n");
        assert_eq!(handle.read(10, 6).unwrap(), b"");
        assert_eq!(handle.read(10, u64::MAX).unwrap(), b"");
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn read_without_callback_is_unsupported_but_write_works() {
        let entry = VirtualEntry::new("control", S_IFREG | 0o200)
            .on_write(|_, data| Ok(data.len()))
            .write_merge(true);
        let mut handle = FileHandle::Virtual(VirtualHandle::new(Arc::new(entry)));

        handle.write(b"1\n", 0).unwrap();
        handle.flush().unwrap();
        assert!(matches!(handle.read(16, 0), Err(FsError::Unsupported)));
        assert_eq!(handle.write(b"2\n", 0).unwrap(), 2);
    }

    #[test]
    fn write_without_callback_is_unsupported() {
        let entry = VirtualEntry::new("actual_brightness", S_IFREG | 0o444)
            .on_read(|_| Ok(b"1\n".to_vec()));
        let mut handle = FileHandle::Virtual(VirtualHandle::new(Arc::new(entry)));
        assert!(matches!(handle.write(b"5", 0), Err(FsError::Unsupported)));
    }

    #[test]
    fn failing_flush_is_not_retried() {
        let attempts = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&attempts);
        let entry = VirtualEntry::new("brightness", S_IFREG | 0o644)
            .on_write(move |_, _| {
                *counter.lock().unwrap() += 1;
                Err(FsError::InvalidArgument)
            })
            .write_merge(true);
        let mut handle = FileHandle::Virtual(VirtualHandle::new(Arc::new(entry)));

        handle.write(b"garbage", 0).unwrap();
        assert!(matches!(handle.flush(), Err(FsError::InvalidArgument)));
        handle.flush().unwrap();
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[test]
    fn real_handle_positioned_io_then_close() {
        let file = tempfile::tempfile().unwrap();
        let mut handle = FileHandle::Real(OwnedFd::from(file));

        assert_eq!(handle.write(b"bl_power", 0).unwrap(), 8);
        assert_eq!(handle.write(b"0\n", 8).unwrap(), 2);
        assert_eq!(handle.read(4, 3).unwrap(), b"powe");
        assert_eq!(handle.read(16, 8).unwrap(), b"0\n");
        handle.flush().unwrap();
        handle.close().unwrap();
    }

    #[test]
    fn table_removes_exactly_once() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_eq!(table.len(), 2);

        assert_eq!(table.remove(a).unwrap(), "a");
        assert!(matches!(table.remove(a), Err(FsError::BadFileDescriptor)));
        assert!(matches!(table.get_mut(a), Err(FsError::BadFileDescriptor)));
        assert_eq!(table.len(), 1);
    }
}
