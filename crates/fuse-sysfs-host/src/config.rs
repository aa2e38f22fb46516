// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! JSON configuration and the static entry provider built from it

use crate::mount::EntryProvider;
use anyhow::{bail, Context, Result};
use fuse_sysfs_core::{parse_num, VirtualEntry};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub const DEFAULT_FS_NAME: &str = "fuse-sysfs";

fn default_fs_name() -> String {
    DEFAULT_FS_NAME.to_string()
}

fn default_perm() -> String {
    "0644".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Log every dispatched operation
    #[serde(default)]
    pub trace: bool,
    /// Source name shown in the mount table
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            trace: false,
            fs_name: default_fs_name(),
            entries: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Dir,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    pub path: String,
    #[serde(default)]
    pub kind: EntryKind,
    /// Permission bits, parsed like a written value (`"0644"` is octal)
    #[serde(default = "default_perm")]
    pub perm: String,
    #[serde(default)]
    pub max_size: u64,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Initial value. Entries without one cannot be read.
    pub content: Option<String>,
    #[serde(default)]
    pub writable: bool,
    /// Writes must parse as an integer and are stored as decimal text.
    #[serde(default)]
    pub numeric: bool,
    #[serde(default)]
    pub write_merge: bool,
}

impl EntryConfig {
    fn mode(&self) -> Result<u32> {
        let perm = parse_num(self.perm.as_bytes())
            .with_context(|| format!("{}: invalid perm {:?}", self.path, self.perm))?;
        if !(0..=0o7777).contains(&perm) {
            bail!("{}: perm {:#o} out of range", self.path, perm);
        }
        let kind = match self.kind {
            EntryKind::File => libc::S_IFREG,
            EntryKind::Dir => libc::S_IFDIR,
        };
        Ok(kind | perm as u32)
    }
}

pub fn load_config(config_path: Option<&Path>) -> Result<HostConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config: HostConfig = serde_json::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(HostConfig::default()),
    }
}

/// Current value of one entry, shared between its callbacks.
pub type ValueCell = Arc<Mutex<Vec<u8>>>;

/// Serves the entries of a [`HostConfig`], keeping written values in memory.
pub struct StaticProvider {
    entries: Vec<EntryConfig>,
    cells: Vec<(String, ValueCell)>,
}

impl StaticProvider {
    pub fn new(entries: Vec<EntryConfig>) -> Self {
        Self {
            entries,
            cells: Vec::new(),
        }
    }

    /// Value cell of the entry at `path`, once `init` has run.
    pub fn value(&self, path: &str) -> Option<&ValueCell> {
        let path = path.trim_start_matches('/');
        self.cells
            .iter()
            .find(|(p, _)| p.trim_start_matches('/') == path)
            .map(|(_, cell)| cell)
    }

    fn build(&self, cfg: &EntryConfig, cell: &ValueCell) -> Result<VirtualEntry> {
        let uid = cfg.uid.unwrap_or_else(|| nix::unistd::getuid().as_raw());
        let gid = cfg.gid.unwrap_or_else(|| nix::unistd::getgid().as_raw());
        let mut entry = VirtualEntry::new(cfg.path.as_str(), cfg.mode()?)
            .max_size(cfg.max_size)
            .owner(uid, gid)
            .write_merge(cfg.write_merge);
        if cfg.kind == EntryKind::Dir {
            return Ok(entry);
        }

        if cfg.content.is_some() {
            let cell = Arc::clone(cell);
            entry = entry.on_read(move |_| {
                Ok(cell.lock().unwrap_or_else(PoisonError::into_inner).clone())
            });
        }
        if cfg.writable {
            let cell = Arc::clone(cell);
            let numeric = cfg.numeric;
            entry = entry.on_write(move |entry, data| {
                let value = if numeric {
                    format!("{}\n", parse_num(data)?).into_bytes()
                } else {
                    data.to_vec()
                };
                debug!(
                    target: "fuse_sysfs::provider",
                    path = entry.path(),
                    len = value.len(),
                    "value stored"
                );
                *cell.lock().unwrap_or_else(PoisonError::into_inner) = value;
                Ok(data.len())
            });
        }
        Ok(entry)
    }
}

impl EntryProvider for StaticProvider {
    fn init(&mut self) -> Result<Vec<VirtualEntry>> {
        self.cells = self
            .entries
            .iter()
            .map(|cfg| {
                let initial = cfg.content.clone().unwrap_or_default().into_bytes();
                (cfg.path.clone(), Arc::new(Mutex::new(initial)))
            })
            .collect();
        let entries = self
            .entries
            .iter()
            .zip(&self.cells)
            .map(|(cfg, (_, cell))| self.build(cfg, cell))
            .collect::<Result<Vec<_>>>()?;
        info!(target: "fuse_sysfs::provider", entries = entries.len(), "static entries prepared");
        Ok(entries)
    }

    fn finalize(&mut self) {
        for (path, cell) in &self.cells {
            let value = cell.lock().unwrap_or_else(PoisonError::into_inner);
            let text = String::from_utf8_lossy(&value);
            debug!(
                target: "fuse_sysfs::provider",
                path = path.as_str(),
                value = text.trim_end(),
                "final value"
            );
        }
        self.cells.clear();
    }
}
