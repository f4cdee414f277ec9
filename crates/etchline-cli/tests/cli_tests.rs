//! Integration tests for the Etchline CLI
//!
//! Targets are regular temporary files, so no privileges or hardware are
//! needed. Every test points `--config-file` into its own temporary
//! directory to stay independent of the user's configuration.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a command for the etchline binary
#[allow(deprecated)]
fn etchline() -> Command {
    Command::cargo_bin("etchline").unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}

/// Temp dir with an image of `image_len` bytes and a zeroed target of `target_len`
fn setup(image_len: usize, target_len: u64) -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("image.img");
    let target = dir.path().join("target.bin");
    let config = dir.path().join("etchline_config.toml");

    fs::write(&image, pattern(image_len)).unwrap();
    fs::File::create(&target)
        .unwrap()
        .set_len(target_len)
        .unwrap();

    (dir, image, target, config)
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    etchline()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("disk images"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("write"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_flag() {
    etchline()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("etchline"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_help() {
    etchline()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_write_help() {
    etchline()
        .args(["write", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Write an image"))
        .stdout(predicate::str::contains("<SOURCE>"))
        .stdout(predicate::str::contains("<TARGET>"))
        .stdout(predicate::str::contains("--checksum"))
        .stdout(predicate::str::contains("--start-step"));
}

#[test]
fn test_verify_flags_conflict() {
    etchline()
        .args(["write", "a.img", "b.bin", "--verify", "--no-verify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ============================================================================
// Write Command Tests
// ============================================================================

#[test]
fn test_write_pads_last_block() {
    let (_dir, image, target, config) = setup(1000, 0);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"))
        .stdout(predicate::str::contains("Verified"));

    let written = fs::read(&target).unwrap();
    assert_eq!(written.len(), 1024);
    assert_eq!(&written[..1000], &pattern(1000)[..]);
    assert!(written[1000..].iter().all(|&b| b == 0));
}

#[test]
fn test_write_no_verify() {
    let (_dir, image, target, config) = setup(4096, 8192);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y", "--no-verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"))
        .stdout(predicate::str::contains("Verified").not());
}

#[test]
fn test_write_json_progress() {
    let (_dir, image, target, config) = setup(100_000, 0);

    let output = etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y", "--json"])
        .args(["--chunk-size", "16K"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines.len() > 4, "{}", stdout);
    assert!(lines.iter().all(|l| l.starts_with('{')));
    assert!(lines[0].contains("\"indefinite\":true"));
    assert!(lines.last().unwrap().contains("\"completed\":true"));
    assert!(lines.last().unwrap().contains("\"percentage\":100.0"));
}

#[test]
fn test_write_missing_source() {
    let (_dir, _image, target, config) = setup(0, 0);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", "/nonexistent/image.img", path_str(&target), "-y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source not found"));
}

#[test]
fn test_write_missing_target() {
    let (_dir, image, _target, config) = setup(512, 0);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), "/nonexistent/target", "-y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open target"));
}

#[test]
fn test_write_checksum_mismatch_leaves_target_untouched() {
    let (_dir, image, target, config) = setup(2048, 4096);
    let wrong = "0".repeat(64);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y"])
        .args(["--checksum", &wrong])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Checksum mismatch"));

    assert!(fs::read(&target).unwrap().iter().all(|&b| b == 0));
}

#[test]
fn test_write_start_step_out_of_range() {
    let (_dir, image, target, config) = setup(512, 512);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y", "--no-verify"])
        .args(["--start-step", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_write_invalid_chunk_size() {
    let (_dir, image, target, config) = setup(512, 512);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y"])
        .args(["--chunk-size", "lots"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid chunk size"));
}

// ============================================================================
// Verify Command Tests
// ============================================================================

#[test]
fn test_verify_matching_target() {
    let (_dir, image, target, config) = setup(3000, 0);
    let mut padded = pattern(3000);
    padded.resize(3072, 0);
    fs::write(&target, padded).unwrap();

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["verify", path_str(&image), path_str(&target)])
        .assert()
        .success()
        .stdout(predicate::str::contains("device matches image"));
}

#[test]
fn test_verify_mismatch() {
    let (_dir, image, target, config) = setup(3000, 4096);

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["verify", path_str(&image), path_str(&target)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Verification failed at byte 0"));
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_shows_defaults() {
    let (_dir, _image, _target, config) = setup(0, 0);

    etchline()
        .args(["--config-file", path_str(&config), "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[write]"))
        .stdout(predicate::str::contains("[weights]"))
        .stdout(predicate::str::contains("[behavior]"))
        .stdout(predicate::str::contains("not found, using defaults"));
}

#[test]
fn test_config_path_flag() {
    let (_dir, _image, _target, config) = setup(0, 0);

    etchline()
        .args(["--config-file", path_str(&config), "config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("etchline_config.toml"));
}

#[test]
fn test_config_json_output() {
    let (_dir, _image, _target, config) = setup(0, 0);

    etchline()
        .args(["--config-file", path_str(&config), "config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stdout(predicate::str::contains("\"weights\""))
        .stdout(predicate::str::contains("\"chunk_size\""));
}

#[test]
fn test_config_init_creates_file() {
    let (_dir, _image, _target, config) = setup(0, 0);

    etchline()
        .args(["--config-file", path_str(&config), "config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let content = fs::read_to_string(&config).unwrap();
    assert!(content.contains("[write]"));
    assert!(content.contains("[weights]"));
}

#[test]
fn test_config_init_warns_if_exists() {
    let (_dir, _image, _target, config) = setup(0, 0);
    fs::write(&config, "[write]\nverify = false").unwrap();

    etchline()
        .args(["--config-file", path_str(&config), "config", "--init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    assert!(fs::read_to_string(&config)
        .unwrap()
        .contains("verify = false"));
}

#[test]
fn test_config_disables_verify() {
    let (_dir, image, target, config) = setup(1024, 1024);
    fs::write(&config, "[write]\nverify = false\n").unwrap();

    etchline()
        .args(["--config-file", path_str(&config)])
        .args(["write", path_str(&image), path_str(&target), "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verified").not());
}
