use probdir::{is_correct_filename, DumpDir, Error, LoadFlags};
use tempfile::tempdir;

#[test]
fn accepts_ordinary_item_names() {
    for name in ["time", "uid", "os_release", "core_backtrace", "dso_list-1"] {
        assert!(is_correct_filename(name), "{name} should be accepted");
    }
}

#[test]
fn rejects_empty_dots_slashes_and_control_bytes() {
    for name in ["", ".", "..", "a/b", "/", "/etc/passwd", "a\nb", "a\tb", "bell\x07"] {
        assert!(!is_correct_filename(name), "{name:?} should be rejected");
    }
}

#[test]
fn bad_name_is_refused_across_operations() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let dd = DumpDir::create(tmp.path().join("dd"), None, 0o640)?;

    let err = dd.save_text("../evil", "x").expect_err("bad name must not save");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::BadItemName(_))
    ));

    let err = dd.exist("a/b").expect_err("bad name must not stat");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::BadItemName(_))
    ));

    let err = dd.load_text("..").expect_err("bad name must not load");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::BadItemName(_))
    ));

    let err = dd.delete_item("x/y").expect_err("bad name must not unlink");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::BadItemName(_))
    ));

    // On the read path the null indicator downgrades the failure.
    let got = dd.load_text_ext(
        "..",
        LoadFlags {
            null_on_failure: true,
            ..Default::default()
        },
    )?;
    assert!(got.is_none());

    Ok(())
}

#[test]
fn release_is_rewritten_to_os_release_on_read() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let dd = DumpDir::create(tmp.path().join("dd"), None, 0o640)?;
    dd.save_text("os_release", "Fedora release 40")?;

    assert_eq!(dd.load_text("release")?, "Fedora release 40");
    Ok(())
}
