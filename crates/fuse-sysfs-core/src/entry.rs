// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Virtual entries and the sorted registry used to look them up
//!
//! A virtual entry is a path under the mount root whose content is produced
//! and consumed by callbacks instead of a real file. The registry is built
//! once, before the request loop starts, and never mutated afterwards.

use crate::error::{FsError, FsResult};
use crate::path::ROOT;
use crate::types::FileStat;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Produces the full content of an entry. Invoked on the first read of
/// every open handle.
pub type ReadCallback = Box<dyn Fn(&VirtualEntry) -> FsResult<Vec<u8>> + Send + Sync>;

/// Consumes written bytes and returns how many were accepted.
pub type WriteCallback = Box<dyn Fn(&VirtualEntry, &[u8]) -> FsResult<usize> + Send + Sync>;

/// Descriptor of a path served by callbacks
pub struct VirtualEntry {
    path: String,
    mode: u32,
    max_size: u64,
    read: Option<ReadCallback>,
    write: Option<WriteCallback>,
    uid: u32,
    gid: u32,
    write_merge: bool,
}

impl VirtualEntry {
    /// Create an entry at `path` (relative to the mount root) reporting
    /// `mode` (`S_IF* | perm`). A leading `/` is tolerated and dropped.
    pub fn new(path: impl Into<String>, mode: u32) -> Self {
        let path = path.into();
        let path = match path.strip_prefix('/') {
            Some(rest) => rest.to_string(),
            None => path,
        };
        Self {
            path,
            mode,
            max_size: 0,
            read: None,
            write: None,
            uid: 0,
            gid: 0,
            write_merge: false,
        }
    }

    /// Advisory size reported by attribute queries
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn on_read<F>(mut self, callback: F) -> Self
    where
        F: Fn(&VirtualEntry) -> FsResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.read = Some(Box::new(callback));
        self
    }

    pub fn on_write<F>(mut self, callback: F) -> Self
    where
        F: Fn(&VirtualEntry, &[u8]) -> FsResult<usize> + Send + Sync + 'static,
    {
        self.write = Some(Box::new(callback));
        self
    }

    /// Accumulate partial writes and deliver them as one unit on flush.
    pub fn write_merge(mut self, enabled: bool) -> Self {
        self.write_merge = enabled;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn size(&self) -> u64 {
        self.max_size
    }

    pub fn is_write_merge(&self) -> bool {
        self.write_merge
    }

    pub fn is_readable(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    /// Attributes reported to the kernel; no real stat call involved.
    pub fn stat(&self) -> FileStat {
        FileStat::synthetic(self.mode, self.uid, self.gid, self.max_size)
    }

    /// Materialize the entry's content through its read callback.
    pub fn read_content(&self) -> FsResult<Vec<u8>> {
        match &self.read {
            Some(read) => read(self),
            None => Err(FsError::Unsupported),
        }
    }

    /// Hand `data` to the write callback.
    pub fn write_content(&self, data: &[u8]) -> FsResult<usize> {
        match &self.write {
            Some(write) => write(self, data),
            None => Err(FsError::Unsupported),
        }
    }
}

impl fmt::Debug for VirtualEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualEntry")
            .field("path", &self.path)
            .field("mode", &format_args!("{:#o}", self.mode))
            .field("max_size", &self.max_size)
            .field("readable", &self.read.is_some())
            .field("writable", &self.write.is_some())
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("write_merge", &self.write_merge)
            .finish()
    }
}

/// Immutable table of virtual entries sorted by path
#[derive(Debug, Default)]
pub struct EntryRegistry {
    entries: Vec<Arc<VirtualEntry>>,
}

impl EntryRegistry {
    /// Sort the table by path (bytewise) and reject duplicate paths.
    pub fn prepare(mut entries: Vec<VirtualEntry>) -> FsResult<Self> {
        entries.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].path == pair[1].path) {
            warn!(
                target: "fuse_sysfs::registry",
                path = %pair[0].path,
                "duplicate virtual entry"
            );
            return Err(FsError::InvalidArgument);
        }
        Ok(Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        })
    }

    /// Binary search for the entry at exactly `path` (normalized form).
    pub fn find(&self, path: &str) -> Option<&Arc<VirtualEntry>> {
        self.entries
            .binary_search_by(|entry| entry.path.as_bytes().cmp(path.as_bytes()))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `dir` is a parent of some virtual entry. The root always is.
    pub fn is_implied_dir(&self, dir: &str) -> bool {
        if dir == ROOT {
            return true;
        }
        let prefix = format!("{dir}/");
        let start = self.entries.partition_point(|e| e.path.as_str() < prefix.as_str());
        self.entries.get(start).is_some_and(|e| e.path.starts_with(&prefix))
    }

    /// Entries that are immediate children of `dir`, paired with the name
    /// they appear under. An entry declared at `dir` itself appears as `.`.
    pub fn children<'a>(
        &'a self,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<VirtualEntry>)> + 'a {
        let root = dir == ROOT;
        let start = if root {
            0
        } else {
            self.entries.partition_point(|e| e.path.as_str() < dir)
        };
        self.entries[start..]
            .iter()
            .take_while(move |e| root || e.path.starts_with(dir))
            .filter_map(move |e| {
                let rest = if root { e.path.as_str() } else { &e.path[dir.len()..] };
                if rest.is_empty() || rest == ROOT {
                    return Some((ROOT, e));
                }
                let name = if root { rest } else { rest.strip_prefix('/')? };
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                Some((name, e))
            })
    }

    /// Names of directories under `dir` implied by deeper virtual entries
    /// without being declared themselves.
    pub fn implied_children<'a>(&'a self, dir: &'a str) -> BTreeSet<&'a str> {
        let root = dir == ROOT;
        let prefix = if root { String::new() } else { format!("{dir}/") };
        let start = self.entries.partition_point(|e| e.path.as_str() < prefix.as_str());
        self.entries[start..]
            .iter()
            .take_while(|e| e.path.starts_with(&prefix))
            .filter_map(|e| {
                let (name, _) = e.path[prefix.len()..].split_once('/')?;
                let declared = if root {
                    self.find(name).is_some()
                } else {
                    self.find(&e.path[..prefix.len() + name.len()]).is_some()
                };
                (!name.is_empty() && !declared).then_some(name)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::{S_IFDIR, S_IFREG};

    fn table(paths: &[&str]) -> EntryRegistry {
        EntryRegistry::prepare(
            paths.iter().map(|p| VirtualEntry::new(*p, S_IFREG | 0o644)).collect(),
        )
        .expect("registry")
    }

    #[test]
    fn find_locates_every_entry_in_any_input_order() {
        let paths = ["brightness", "a/b", "max_brightness", "a", "a/c/d", "actual_brightness"];
        // Rotations give several distinct unsorted permutations
        for shift in 0..paths.len() {
            let mut rotated = paths.to_vec();
            rotated.rotate_left(shift);
            let registry = table(&rotated);
            for path in paths {
                assert_eq!(registry.find(path).map(|e| e.path()), Some(path));
            }
            for missing in ["", ".", "b", "a/", "a/c", "brightnesz", "zzz"] {
                assert!(registry.find(missing).is_none(), "{missing} should be absent");
            }
        }
    }

    #[test]
    fn leading_slash_is_dropped() {
        let registry = table(&["/brightness"]);
        assert!(registry.find("brightness").is_some());
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = EntryRegistry::prepare(vec![
            VirtualEntry::new("x", S_IFREG | 0o644),
            VirtualEntry::new("x", S_IFREG | 0o600),
        ])
        .unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument));
    }

    #[test]
    fn children_are_immediate_only() {
        let registry = table(&["top", "dev", "dev/power", "dev/power/level", "device", "dev2/x"]);

        let mut root: Vec<_> = registry.children(ROOT).map(|(n, _)| n).collect();
        root.sort_unstable();
        assert_eq!(root, vec!["dev", "device", "top"]);

        let dev: Vec<_> = registry.children("dev").map(|(n, _)| n).collect();
        assert_eq!(dev, vec![".", "power"]);

        let power: Vec<_> = registry.children("dev/power").map(|(n, _)| n).collect();
        assert_eq!(power, vec![".", "level"]);
    }

    #[test]
    fn implied_children_skip_declared_directories() {
        let registry = table(&["leds", "leds/kbd/brightness", "power/level", "power/wakeup/x"]);
        assert_eq!(registry.implied_children(ROOT).into_iter().collect::<Vec<_>>(), vec!["power"]);
        assert_eq!(registry.implied_children("leds").into_iter().collect::<Vec<_>>(), vec!["kbd"]);
        assert_eq!(
            registry.implied_children("power").into_iter().collect::<Vec<_>>(),
            vec!["wakeup"]
        );
        assert!(registry.implied_children("power/wakeup").is_empty());
    }

    #[test]
    fn implied_directories() {
        let registry = table(&["power/level", "powered"]);
        assert!(registry.is_implied_dir(ROOT));
        assert!(registry.is_implied_dir("power"));
        assert!(!registry.is_implied_dir("powered"));
        assert!(!registry.is_implied_dir("pow"));
    }

    #[test]
    fn callbacks_absent_are_unsupported() {
        let entry = VirtualEntry::new("dir", S_IFDIR | 0o755);
        assert!(matches!(entry.read_content(), Err(FsError::Unsupported)));
        assert!(matches!(entry.write_content(b"1"), Err(FsError::Unsupported)));
    }
}
