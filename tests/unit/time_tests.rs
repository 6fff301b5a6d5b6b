//! Grammar of the required `time` item, exercised through the open
//! flow's validity check.

use std::fs;
use std::path::PathBuf;

use probdir::{DumpDir, Error, OpenFlags};
use tempfile::{tempdir, TempDir};

fn dir_with_time(content: &[u8]) -> (TempDir, PathBuf) {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("dd");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("time"), content).unwrap();
    (tmp, dir)
}

fn open_fast(dir: &PathBuf) -> probdir::Result<DumpDir> {
    DumpDir::open(
        dir,
        OpenFlags {
            dont_wait_for_lock: true,
            ..Default::default()
        },
    )
}

fn assert_not_problem_dir(content: &[u8]) {
    let (_tmp, dir) = dir_with_time(content);
    let err = open_fast(&dir).expect_err("malformed time must not open");
    assert!(
        matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotProblemDir(_))
        ),
        "{content:?} produced {err:?}"
    );
    // The failed open backed off: no lock left behind.
    assert!(!dir.join(".lock").exists());
}

#[test]
fn plain_timestamp_opens() {
    let (_tmp, dir) = dir_with_time(b"1700000000");
    let dd = open_fast(&dir).unwrap();
    assert_eq!(dd.time(), Some(1_700_000_000));
}

#[test]
fn trailing_newline_is_allowed() {
    let (_tmp, dir) = dir_with_time(b"1700000000\n");
    let dd = open_fast(&dir).unwrap();
    assert_eq!(dd.time(), Some(1_700_000_000));
}

#[test]
fn rejects_signed_spaced_and_garbage_input() {
    assert_not_problem_dir(b"-1700000000");
    assert_not_problem_dir(b" 1700000000");
    assert_not_problem_dir(b"1700000000 ");
    assert_not_problem_dir(b"17000x");
    assert_not_problem_dir(b"");
    assert_not_problem_dir(b"\n");
}

#[test]
fn rejects_overlong_value() {
    assert_not_problem_dir(b"99999999999999999999999999999999999999999999999999999999999999");
}

#[test]
fn rejects_hardlinked_time_item() {
    let (_tmp, dir) = dir_with_time(b"1700000000");
    fs::hard_link(dir.join("time"), dir.join("time2")).unwrap();
    let err = open_fast(&dir).expect_err("hardlinked time must not open");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotProblemDir(_))
    ));
}

#[test]
fn rejects_symlinked_time_item() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("dd");
    fs::create_dir(&dir).unwrap();
    fs::write(tmp.path().join("real_time"), b"1700000000").unwrap();
    std::os::unix::fs::symlink(tmp.path().join("real_time"), dir.join("time")).unwrap();

    let err = open_fast(&dir).expect_err("symlinked time must not open");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotProblemDir(_))
    ));
}
