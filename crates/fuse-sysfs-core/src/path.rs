// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path normalization and classification
//!
//! The kernel presents paths relative to the mount root with a leading
//! separator. The registry and the `*at` syscalls against the backing
//! directory descriptor expect paths relative to that descriptor instead.
//! Paths are raw bytes; only registry lookups need them to be UTF-8.

use crate::entry::{EntryRegistry, VirtualEntry};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;

/// Canonical token for the mount root
pub const ROOT: &str = ".";

/// Strip the leading `/`; the empty path and `..` map to [`ROOT`].
///
/// Repeated leading separators are all stripped so that normalizing twice
/// yields the same result.
pub fn normalize(raw: &OsStr) -> &OsStr {
    let bytes = raw.as_bytes();
    let start = bytes.iter().position(|&b| b != b'/').unwrap_or(bytes.len());
    let path = &bytes[start..];
    if path.is_empty() || path == b".." {
        OsStr::new(ROOT)
    } else {
        OsStr::from_bytes(path)
    }
}

/// Child path of a normalized directory, in normalized form.
pub fn join(dir: &OsStr, name: &OsStr) -> OsString {
    if dir == ROOT {
        return name.to_os_string();
    }
    let mut path = OsString::with_capacity(dir.len() + 1 + name.len());
    path.push(dir);
    path.push("/");
    path.push(name);
    path
}

/// What backs a normalized path
#[derive(Debug, Clone)]
pub enum PathClass<'a> {
    /// Declared virtual entry
    Virtual(&'a Arc<VirtualEntry>),
    /// Parent of virtual entries; may or may not also exist for real
    ImpliedDir,
    /// Served by the backing directory only
    Passthrough,
}

/// Classify `path` (already normalized) against the registry.
pub fn classify<'a>(registry: &'a EntryRegistry, path: &OsStr) -> PathClass<'a> {
    // Virtual entries are declared with UTF-8 paths.
    let Some(path) = path.to_str() else {
        return PathClass::Passthrough;
    };
    if let Some(entry) = registry.find(path) {
        PathClass::Virtual(entry)
    } else if path != ROOT && registry.is_implied_dir(path) {
        PathClass::ImpliedDir
    } else {
        PathClass::Passthrough
    }
}
