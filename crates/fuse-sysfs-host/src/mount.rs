// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount lifecycle: provider init, overlay construction, the request loop
//! and provider finalization.

use anyhow::{Context, Result};
use fuse_sysfs_core::{OverlayFs, SysfsOps, VirtualEntry};
use std::path::PathBuf;
use tracing::info;

/// Source of the virtual entry table.
///
/// `init` runs once before the overlay is built; `finalize` runs once after
/// the request loop exits, including when mounting failed.
pub trait EntryProvider {
    fn init(&mut self) -> Result<Vec<VirtualEntry>>;

    fn finalize(&mut self) {}
}

#[derive(Clone, Debug)]
pub struct MountSettings {
    pub mount_point: PathBuf,
    /// Directory served by passthrough; usually the mount point itself.
    pub backing_dir: PathBuf,
    pub fs_name: String,
    pub trace: bool,
}

/// Mount options for a session. `allow_other` is only requested when
/// running as root; otherwise fuser restricts access to the mounting user.
#[cfg(all(feature = "fuse", target_os = "linux"))]
pub fn mount_options(fs_name: &str, is_root: bool) -> Vec<fuser::MountOption> {
    use fuser::MountOption;

    let mut options = vec![
        MountOption::FSName(fs_name.to_string()),
        MountOption::DefaultPermissions,
        MountOption::AutoUnmount,
        MountOption::NoDev,
        MountOption::NoExec,
        MountOption::NoSuid,
    ];
    if is_root {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Wrap the overlay in the operation logger when asked to.
fn dispatcher(overlay: OverlayFs, trace: bool) -> Box<dyn SysfsOps + Send> {
    #[cfg(feature = "trace")]
    if trace {
        return Box::new(fuse_sysfs_core::Traced::new(overlay));
    }
    #[cfg(not(feature = "trace"))]
    if trace {
        tracing::warn!("operation tracing not compiled in; rebuild with the `trace` feature");
    }
    Box::new(overlay)
}

/// Serve `provider`'s entries over `settings.backing_dir` until unmounted.
pub fn run<P: EntryProvider + ?Sized>(provider: &mut P, settings: &MountSettings) -> Result<()> {
    let entries = provider.init().context("entry provider failed to initialize")?;
    let result = serve(entries, settings);
    provider.finalize();
    result
}

fn serve(entries: Vec<VirtualEntry>, settings: &MountSettings) -> Result<()> {
    // Opened before mounting: once mounted, the backing path may resolve
    // into this filesystem.
    let overlay = OverlayFs::new(&settings.backing_dir, entries)
        .with_context(|| format!("opening backing directory {}", settings.backing_dir.display()))?;
    let ops = dispatcher(overlay, settings.trace);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let filesystem = crate::adapter::SysfsFuse::new(ops);
        let options = mount_options(&settings.fs_name, nix::unistd::geteuid().is_root());
        info!(
            mount_point = %settings.mount_point.display(),
            fs_name = settings.fs_name.as_str(),
            "mounting; blocking until unmount"
        );
        fuser::mount2(filesystem, &settings.mount_point, &options)
            .with_context(|| format!("mounting on {}", settings.mount_point.display()))?;
        info!("unmounted");
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        drop(ops);
        tracing::warn!("FUSE support not compiled in. This binary is for testing only.");
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}
