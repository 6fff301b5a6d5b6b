use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};

use probdir::{delete_dump_dir, DumpDir, Error, OpenFlags};
use tempfile::tempdir;

#[test]
fn delete_removes_directory_and_lock() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let dir = tmp.path().join("dd");
    let mut dd = DumpDir::create(&dir, None, 0o640)?;
    dd.create_basic_files(Some(1000), None)?;

    dd.delete()?;
    assert!(!dir.exists());
    Ok(())
}

#[test]
fn delete_recurses_into_subdirectories() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let dir = tmp.path().join("dd");
    let dd = DumpDir::create(&dir, None, 0o640)?;
    dd.save_text("time", "1700000000")?;

    fs::create_dir_all(dir.join("sub/deeper"))?;
    fs::write(dir.join("sub/file"), b"x")?;
    fs::write(dir.join("sub/deeper/file"), b"y")?;

    dd.delete()?;
    assert!(!dir.exists());
    Ok(())
}

#[test]
fn delete_removes_symlinks_without_following() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let outside = tmp.path().join("keep.txt");
    fs::write(&outside, b"important")?;

    let dir = tmp.path().join("dd");
    let dd = DumpDir::create(&dir, None, 0o640)?;
    dd.save_text("time", "1700000000")?;
    symlink(&outside, dir.join("link"))?;

    dd.delete()?;
    assert!(!dir.exists());
    assert!(outside.exists());
    Ok(())
}

#[test]
fn delete_dump_dir_opens_and_deletes() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let dir = tmp.path().join("dd");
    let mut dd = DumpDir::create(&dir, None, 0o640)?;
    dd.create_basic_files(None, None)?;
    drop(dd);

    delete_dump_dir(&dir)?;
    assert!(!dir.exists());
    Ok(())
}

#[test]
fn unlocked_handle_cannot_delete() {
    if unsafe { libc::geteuid() } == 0 {
        eprintln!("skipped: root is never denied write access");
        return;
    }

    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("dd");
    let mut dd = DumpDir::create(&dir, None, 0o640).unwrap();
    dd.create_basic_files(None, None).unwrap();
    drop(dd);

    let mut perms = fs::metadata(&dir).unwrap().permissions();
    perms.set_mode(0o500);
    fs::set_permissions(&dir, perms).unwrap();

    let dd = DumpDir::open(
        &dir,
        OpenFlags {
            readonly: true,
            ..Default::default()
        },
    )
    .unwrap();
    let err = dd.delete().expect_err("unlocked handle must not delete");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotLocked(_))
    ));
    assert!(dir.exists());

    let mut perms = fs::metadata(&dir).unwrap().permissions();
    perms.set_mode(0o750);
    fs::set_permissions(&dir, perms).unwrap();
}
