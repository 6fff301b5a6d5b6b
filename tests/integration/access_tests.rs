use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use probdir::access::{
    accessible_by_uid, accessible_by_uid_at_with, accessible_by_uid_with, OwnershipPolicy,
};
use probdir::{DumpDir, OpenFlags};
use tempfile::{tempdir, TempDir};

fn euid() -> u32 {
    unsafe { libc::geteuid() }
}

fn valid_dir(mode: u32) -> (TempDir, PathBuf) {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("dd");
    let mut dd = DumpDir::create(&dir, None, mode).unwrap();
    dd.create_basic_files(None, None).unwrap();
    drop(dd);
    (tmp, dir)
}

#[test]
fn root_can_read_any_dump_dir() {
    let (_tmp, dir) = valid_dir(0o640);
    assert!(accessible_by_uid(&dir, 0));
    assert!(accessible_by_uid_with(&dir, 0, OwnershipPolicy::OwnedByUser));
    assert!(accessible_by_uid_with(&dir, 0, OwnershipPolicy::GroupMember));
}

#[test]
fn world_readable_dir_is_accessible_to_anyone() {
    let (_tmp, dir) = valid_dir(0o644);
    assert_eq!(
        fs::metadata(&dir).unwrap().permissions().mode() & 0o777,
        0o755
    );
    assert!(accessible_by_uid_with(&dir, 12345, OwnershipPolicy::OwnedByUser));
    assert!(accessible_by_uid_with(&dir, 12345, OwnershipPolicy::GroupMember));
}

#[test]
fn owner_policy_grants_the_inode_owner() {
    let (_tmp, dir) = valid_dir(0o640);
    assert!(accessible_by_uid_with(
        &dir,
        euid(),
        OwnershipPolicy::OwnedByUser
    ));
    // A stranger's uid gets nothing from a 0750 directory.
    assert!(!accessible_by_uid_with(
        &dir,
        euid() + 12345,
        OwnershipPolicy::OwnedByUser
    ));
}

#[test]
fn group_policy_grants_primary_group_members() {
    let (_tmp, dir) = valid_dir(0o640);
    // The directory was created with our own gid, so our own uid passes
    // the primary-gid branch of the membership check.
    assert!(accessible_by_uid_with(
        &dir,
        euid(),
        OwnershipPolicy::GroupMember
    ));
}

#[test]
fn predicate_also_works_on_an_open_fd() -> probdir::Result<()> {
    let (_tmp, dir) = valid_dir(0o640);
    let dd = DumpDir::open(&dir, OpenFlags::default())?;
    assert!(accessible_by_uid_at_with(
        dd.as_dir_fd(),
        0,
        OwnershipPolicy::GroupMember
    ));
    Ok(())
}

#[test]
fn missing_or_non_directory_paths_are_inaccessible() {
    let tmp = tempdir().unwrap();
    assert!(!accessible_by_uid(tmp.path().join("nope"), 0));

    let file = tmp.path().join("file");
    fs::write(&file, b"x").unwrap();
    assert!(!accessible_by_uid(&file, 0));
}
