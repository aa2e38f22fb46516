// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory listings merging the backing directory with virtual entries

use crate::entry::EntryRegistry;
use crate::error::FsResult;
use crate::handle::DirHandle;
use crate::path::{join, ROOT};
use crate::types::{DirEntry, FileStat};
use libc::{S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK};
use nix::dir::Type;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use tracing::debug;

/// Mode reported for directories that exist only as parents of virtual entries
pub const SYNTHETIC_DIR_MODE: u32 = S_IFDIR | 0o755;

/// List `path` (normalized) through `handle`.
///
/// Real children are emitted first, minus those shadowed by a virtual entry
/// at `path/name`. Virtual children follow with their own attributes, then
/// any undeclared directories implied by deeper entries. Names are unique;
/// order is unspecified.
pub fn list(
    registry: &EntryRegistry,
    path: &OsStr,
    handle: &mut DirHandle,
) -> FsResult<Vec<DirEntry>> {
    let mut listing = Vec::new();
    let mut seen: HashSet<OsString> = HashSet::new();

    if let DirHandle::Real(dir) = handle {
        for entry in dir.iter() {
            let entry = entry?;
            let name = OsStr::from_bytes(entry.file_name().to_bytes());
            if name != ".." {
                let candidate = if name == "." {
                    path.to_os_string()
                } else {
                    join(path, name)
                };
                if candidate.to_str().is_some_and(|c| registry.find(c).is_some()) {
                    debug!(
                        target: "fuse_sysfs::dir",
                        dir = ?path,
                        ?name,
                        "shadowed by virtual entry"
                    );
                    continue;
                }
            }
            if !seen.insert(name.to_os_string()) {
                continue;
            }
            listing.push(DirEntry {
                name: name.to_os_string(),
                kind: entry.file_type().map(type_bits).unwrap_or(0),
                stat: None,
            });
        }
    }

    // Virtual entries only live under UTF-8 paths.
    if let Some(dir) = path.to_str() {
        for (name, entry) in registry.children(dir) {
            if seen.insert(OsString::from(name)) {
                listing.push(DirEntry {
                    name: OsString::from(name),
                    kind: entry.mode() & S_IFMT,
                    stat: Some(entry.stat()),
                });
            }
        }

        for name in registry.implied_children(dir) {
            if seen.insert(OsString::from(name)) {
                listing.push(DirEntry {
                    name: OsString::from(name),
                    kind: S_IFDIR,
                    stat: Some(FileStat::synthetic(SYNTHETIC_DIR_MODE, 0, 0, 0)),
                });
            }
        }
    }

    if path == ROOT && seen.insert(OsString::from(ROOT)) {
        listing.push(DirEntry {
            name: OsString::from(ROOT),
            kind: S_IFDIR,
            stat: None,
        });
    }

    Ok(listing)
}

fn type_bits(kind: Type) -> u32 {
    match kind {
        Type::Fifo => S_IFIFO,
        Type::CharacterDevice => S_IFCHR,
        Type::Directory => S_IFDIR,
        Type::BlockDevice => S_IFBLK,
        Type::File => S_IFREG,
        Type::Symlink => S_IFLNK,
        Type::Socket => S_IFSOCK,
    }
}
