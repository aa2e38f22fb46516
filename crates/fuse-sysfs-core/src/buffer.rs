// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Zero-filled, growable byte buffer backing virtual file handles

use crate::error::{FsError, FsResult};

/// Owned byte region whose length is the furthest extent ever written.
///
/// Growth goes through `Vec::try_reserve`, so capacity grows geometrically
/// and allocation failure surfaces as [`FsError::NoMemory`] instead of an
/// abort. Gaps between the old length and a new write offset read back as
/// zeros.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GrowBuffer {
    data: Vec<u8>,
}

impl GrowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap content produced by a read callback.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Make `[offset, offset + size)` addressable, zero-filling any new bytes.
    pub fn ensure(&mut self, size: usize, offset: usize) -> FsResult<()> {
        let end = offset.checked_add(size).ok_or(FsError::InvalidArgument)?;
        if end <= self.data.len() {
            return Ok(());
        }
        self.data.try_reserve(end - self.data.len())?;
        self.data.resize(end, 0);
        Ok(())
    }

    /// Copy `bytes` in at `offset`, growing as needed.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> FsResult<()> {
        self.ensure(bytes.len(), offset)?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// The window `[offset, offset + size)` clipped to the current length.
    /// Empty past the end.
    pub fn read_at(&self, offset: usize, size: usize) -> &[u8] {
        if offset >= self.data.len() {
            return &[];
        }
        let end = offset.saturating_add(size).min(self.data.len());
        &self.data[offset..end]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}
