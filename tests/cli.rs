//! End-to-end CLI scenarios driven through the `fatimg` binary itself
//! via `assert_cmd`, exercising the process boundary rather than calling
//! the library directly.

use assert_cmd::Command;
use predicates::prelude::*;

fn fatimg() -> Command {
    Command::cargo_bin("fatimg").unwrap()
}

#[test]
fn format_1_44mb_floppy_produces_exact_size() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg()
        .args(["format", "--blocks", "1440", img.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(std::fs::metadata(&img).unwrap().len(), 1_474_560);
}

#[test]
fn format_verbose_reports_fat12_fields() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg()
        .args(["format", "--blocks", "1440", "-v", img.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("size_fat: 12"))
        .stdout(predicate::str::contains("sectors_per_cluster: 1"))
        .stdout(predicate::str::contains("root_entries: 224"));
}

#[test]
fn format_512mib_reports_fat32() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg()
        .args(["format", "--blocks", "524288", "-v", img.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("size_fat: 32"))
        .stdout(predicate::str::contains("root_cluster: 2"));
}

#[test]
fn copy_roundtrip_hello_file() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");
    let host_src = dir.path().join("hello.txt");
    std::fs::write(&host_src, b"hello\n").unwrap();

    fatimg().args(["format", "--blocks", "1440", img.to_str().unwrap()]).assert().success();

    fatimg()
        .args(["copy", "-i", img.to_str().unwrap(), host_src.to_str().unwrap(), "::/"])
        .assert()
        .success();

    fatimg()
        .args(["list", "-i", img.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("HELLO.TXT"))
        .stdout(predicate::str::contains("6"));

    let host_out = dir.path().join("out.txt");
    fatimg()
        .args(["copy", "-i", img.to_str().unwrap(), "::/HELLO.TXT", host_out.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(std::fs::read(&host_out).unwrap(), b"hello\n");
}

#[test]
fn overwrite_keeps_single_directory_entry() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");
    let host_src = dir.path().join("hello.txt");

    fatimg().args(["format", "--blocks", "1440", img.to_str().unwrap()]).assert().success();

    std::fs::write(&host_src, b"hello\n").unwrap();
    fatimg()
        .args(["copy", "-i", img.to_str().unwrap(), host_src.to_str().unwrap(), "::/"])
        .assert()
        .success();

    std::fs::write(&host_src, b"0123456789").unwrap();
    fatimg()
        .args(["copy", "-i", img.to_str().unwrap(), host_src.to_str().unwrap(), "::/"])
        .assert()
        .success();

    let output = fatimg().args(["list", "-i", img.to_str().unwrap()]).output().unwrap();
    let text = String::from_utf8_lossy(&output.stdout);
    assert_eq!(text.matches("HELLO.TXT").count(), 1);
    assert!(text.contains("10"));
}

#[test]
fn mkdir_nested_links_dotdot_to_parent() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg().args(["format", "--blocks", "1440", img.to_str().unwrap()]).assert().success();
    fatimg().args(["mkdir", "-i", img.to_str().unwrap(), "/a"]).assert().success();
    fatimg().args(["mkdir", "-i", img.to_str().unwrap(), "/a/b"]).assert().success();

    fatimg()
        .args(["list", "-i", img.to_str().unwrap(), "/a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B"))
        .stdout(predicate::str::contains("<DIR>"));
}

#[test]
fn mkdir_rejects_existing_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg().args(["format", "--blocks", "1440", img.to_str().unwrap()]).assert().success();
    fatimg().args(["mkdir", "-i", img.to_str().unwrap(), "/a"]).assert().success();
    fatimg().args(["mkdir", "-i", img.to_str().unwrap(), "/a"]).assert().failure().code(1);
}

#[test]
fn format_rejects_label_with_asterisk() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg()
        .args(["format", "--blocks", "1440", "-n", "bad*name", img.to_str().unwrap()])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn copy_rejects_directory_target_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("foo.img");

    fatimg().args(["format", "--blocks", "1440", img.to_str().unwrap()]).assert().success();
    fatimg().args(["mkdir", "-i", img.to_str().unwrap(), "/A"]).assert().success();

    let host_src = dir.path().join("a.txt");
    std::fs::write(&host_src, b"x").unwrap();
    fatimg()
        .args(["copy", "-i", img.to_str().unwrap(), host_src.to_str().unwrap(), "::/A"])
        .assert()
        .failure();
}
