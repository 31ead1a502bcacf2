//! Tests for the harness binary's command-line contract.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use codebox_protocol::{NO_ENTRY_POINT_MESSAGE, OutputStream, RunOutput, StreamFrame, exception_kind};
use predicates::prelude::*;
use pretty_assertions::assert_eq;

const POLICY: &str = r#"
[sandbox]
enforcement = "best-effort"

[filesystem]
read_only = ["/"]

[network]
allow = true

[limits]
wall_clock_ms = 5000
"#;

fn harness() -> Command {
    Command::cargo_bin("codebox-harness").unwrap()
}

fn write_policy(dir: &Path) -> String {
    let path = dir.join("policy.toml");
    fs::write(&path, POLICY).unwrap();
    path.display().to_string()
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn run_output(stdout: &[u8]) -> RunOutput {
    RunOutput::from_harness_stdout(std::str::from_utf8(stdout).unwrap()).unwrap()
}

#[test]
fn test_bad_arguments_print_fallback_record() {
    let assert = harness().arg("execute").assert().failure().code(1);
    let output = run_output(&assert.get_output().stdout);
    assert!(output
        .stream_text(OutputStream::Err)
        .starts_with("InvalidArguments: "));
}

#[test]
fn test_unrendered_policy_prints_policy_error() {
    let dir = tempfile::tempdir().unwrap();
    let policy = dir.path().join("policy.toml");
    fs::write(&policy, "[filesystem]\nread_only = [\"%%LIB_DIR%%\"]\n").unwrap();

    let assert = harness()
        .args(["run", policy.to_str().unwrap(), "32"])
        .arg(dir.path())
        .arg("main")
        .assert()
        .failure();
    let output = run_output(&assert.get_output().stdout);
    assert!(output
        .stream_text(OutputStream::Err)
        .starts_with("PolicyError: "));
}

#[test]
fn test_unreadable_policy_lists_cause() {
    let dir = tempfile::tempdir().unwrap();
    let policy = dir.path().join("absent.toml");

    let assert = harness()
        .args(["run", policy.to_str().unwrap(), "32"])
        .arg(dir.path())
        .arg("main")
        .assert()
        .failure();
    let output = run_output(&assert.get_output().stdout);
    let text = output.stream_text(OutputStream::Err);
    assert!(text.starts_with(&format!("PolicyError: Failed to read policy {}", policy.display())));
    assert!(text.contains("\nCaused by: "));
}

#[test]
fn test_missing_entry_point_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let policy = write_policy(dir.path());

    let assert = harness()
        .args(["run", &policy, "64"])
        .arg(dir.path())
        .arg("does.not.exist")
        .assert()
        .success();
    let output = run_output(&assert.get_output().stdout);
    assert_eq!(
        output,
        RunOutput::new(format!("<errStream>{NO_ENTRY_POINT_MESSAGE}\n</errStream>"))
    );
}

#[test]
fn test_run_prints_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let policy = write_policy(dir.path());
    write_script(dir.path(), "main", "echo \"args: $*\"\necho warn >&2\nexit 2");

    let assert = harness()
        .args(["run", &policy, "256"])
        .arg(dir.path())
        .args(["main", "a", "-b"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("\n"));
    let output = run_output(&assert.get_output().stdout);
    assert_eq!(output.stream_text(OutputStream::Out), "args: a -b\n");
    assert_eq!(output.stream_text(OutputStream::Err), "warn\n");
    assert_eq!(
        output.exception.unwrap().kind,
        exception_kind::EXIT_STATUS
    );
}

#[test]
fn test_streaming_prints_frames() {
    let dir = tempfile::tempdir().unwrap();
    let policy = write_policy(dir.path());
    write_script(dir.path(), "main", "echo one\nexit 1");

    let assert = harness()
        .args(["run-streaming", &policy, "256"])
        .arg(dir.path())
        .arg("main")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let frames: Vec<StreamFrame> = stdout.lines().flat_map(StreamFrame::decode_line).collect();

    assert_eq!(frames.first(), Some(&StreamFrame::OutStream("one\n".to_string())));
    assert!(matches!(
        frames.last(),
        Some(StreamFrame::Exception(e)) if e.kind == exception_kind::EXIT_STATUS
    ));
}
