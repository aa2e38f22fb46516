// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fuse-sysfs host: mounts a passthrough overlay with virtual entries
//!
//! The overlay normally shadows the directory it is mounted on: real files
//! stay reachable, while the configured virtual entries are answered by
//! this process.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;
mod config;
mod inodes;
mod mount;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use config::{load_config, StaticProvider};
use mount::MountSettings;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log verbosity used when `RUST_LOG` is not set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Directory served by passthrough (defaults to the mount point)
    #[arg(long)]
    backing_dir: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every dispatched operation and its outcome
    #[arg(long)]
    trace: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    info!("Starting fuse-sysfs host");
    info!("Mount point: {}", args.mount_point.display());

    let config = load_config(args.config.as_deref())?;
    let settings = MountSettings {
        backing_dir: args.backing_dir.unwrap_or_else(|| args.mount_point.clone()),
        mount_point: args.mount_point,
        fs_name: config.fs_name,
        trace: args.trace || config.trace,
    };
    info!(
        backing_dir = %settings.backing_dir.display(),
        entries = config.entries.len(),
        trace = settings.trace,
        "configuration loaded"
    );

    let mut provider = StaticProvider::new(config.entries);
    mount::run(&mut provider, &settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_dir_defaults_to_mount_point() {
        let args = Args::try_parse_from(["fuse-sysfs-host", "/sys/class/backlight/gmux"]).unwrap();
        assert_eq!(args.backing_dir, None);
        assert_eq!(args.log_level, LogLevel::Info);
        assert!(!args.trace);
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from([
            "fuse-sysfs-host",
            "/mnt",
            "--backing-dir",
            "/srv/real",
            "--config",
            "entries.json",
            "--trace",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.backing_dir, Some(PathBuf::from("/srv/real")));
        assert_eq!(args.config, Some(PathBuf::from("entries.json")));
        assert!(args.trace);
        assert_eq!(args.log_level.as_filter(), "debug");
    }

    #[test]
    fn mount_point_is_required() {
        assert!(Args::try_parse_from(["fuse-sysfs-host"]).is_err());
    }
}
