// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::process::Command;

#[test]
fn host_binary_help_runs() {
    // Running with --help should not attempt a mount and must succeed
    let output = Command::new(env!("CARGO_BIN_EXE_fuse-sysfs-host"))
        .arg("--help")
        .output()
        .expect("able to execute fuse-sysfs-host");

    assert!(output.status.success(), "--help should succeed");
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("--backing-dir"));
    assert!(help.contains("--trace"));
}

#[test]
fn missing_config_file_fails_before_mounting() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_fuse-sysfs-host"))
        .arg(tmp.path())
        .arg("--config")
        .arg(tmp.path().join("absent.json"))
        .env("RUST_LOG", "off")
        .output()
        .expect("able to execute fuse-sysfs-host");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("reading config"));
}
