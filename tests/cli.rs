#![cfg(unix)]

mod common;

use assert_cmd::Command;
use common::FakeHost;
use predicates::prelude::*;
use std::fs;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("sfdisk-backup").unwrap();
    cmd.env("RUST_LOG", "info");
    cmd
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("table"))
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("archive"));
}

#[test]
fn missing_device_is_input_error() {
    cli()
        .args(["--sudo", "table", "/dev/definitely-not-a-disk"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn unknown_compression_rejected() {
    cli()
        .args(["archive", "/dev/sda", "--target", "/tmp/x", "--compression", "lzma"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lzma"));
}

#[test]
fn archive_without_target_fails_validation() {
    cli()
        .args(["--sudo", "archive", "/dev/sda", "--skip-preflight"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No target directory"));
}

#[test]
fn bad_config_file_reported() {
    let host = FakeHost::new();
    let path = host.dir.path().join("bad.toml");
    fs::write(&path, "pool_name = \"zroot\"\n").unwrap();

    cli()
        .args(["--config"])
        .arg(&path)
        .args(["table", "/dev/sda"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn table_prints_partitions() {
    let host = FakeHost::new();

    cli()
        .arg("--config")
        .arg(host.config_file())
        .arg("table")
        .arg(host.device())
        .assert()
        .success()
        .stdout(predicate::str::contains("label dos, id 0x1f2e3d4c"))
        .stdout(predicate::str::contains("/dev/disk0p2"))
        .stdout(predicate::str::contains("4.0 GiB"));
}

#[test]
fn table_json_is_parseable() {
    let host = FakeHost::new();

    let output = cli()
        .arg("--config")
        .arg(host.config_file())
        .arg("table")
        .arg(host.device())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let table: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(table["label"], "dos");
    assert_eq!(table["partitions"]["2"]["start"], 526336);
}

#[test]
fn dump_prints_sfdisk_script() {
    let host = FakeHost::new();

    cli()
        .arg("--config")
        .arg(host.config_file())
        .arg("dump")
        .arg(host.device())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("label: dos"));
}

#[test]
fn archive_end_to_end() {
    let host = FakeHost::new();

    cli()
        .arg("--config")
        .arg(host.config_file())
        .arg("archive")
        .arg(host.device())
        .arg("--target")
        .arg(host.target())
        .args(["--prefix", "laptop", "--mbr", "header.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("laptop-disk0p1.img.tar.xz"))
        .stdout(predicate::str::contains("skipped (swap holds no data)"));

    assert!(host.target().join("header.bin").exists());
    assert!(host.target().join("laptop.sfdisk").exists());
}

#[test]
fn archive_failure_exit_code() {
    let host = FakeHost::new();
    host.failing_tool("partclone.fat", "cannot open source");

    cli()
        .arg("--config")
        .arg(host.config_file())
        .arg("archive")
        .arg(host.device())
        .arg("--target")
        .arg(host.target())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("disk0p1"));
}
