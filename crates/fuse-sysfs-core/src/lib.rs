// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fuse-sysfs core: passthrough overlay with callback-backed virtual entries
//!
//! This crate holds everything the kernel adapter dispatches into: the
//! virtual entry registry, path classification, per-open handle state, the
//! merged directory listing and the [`OverlayFs`] operation set. It has no
//! dependency on the FUSE library itself.

pub mod buffer;
pub mod dir;
pub mod entry;
pub mod error;
pub mod handle;
pub mod ops;
pub mod overlay;
pub mod parse;
pub mod path;
#[cfg(feature = "trace")]
pub mod trace;
pub mod types;

pub use buffer::GrowBuffer;
pub use entry::{EntryRegistry, ReadCallback, VirtualEntry, WriteCallback};
pub use error::{FsError, FsResult};
pub use ops::SysfsOps;
pub use overlay::OverlayFs;
pub use parse::parse_num;
pub use path::{normalize, ROOT};
#[cfg(feature = "trace")]
pub use trace::Traced;
pub use types::{DirEntry, FileStat, FileTimes};
