use probdir::{DumpDir, ReportResult};
use tempfile::{tempdir, TempDir};

fn fresh() -> (TempDir, DumpDir) {
    let tmp = tempdir().unwrap();
    let dd = DumpDir::create(tmp.path().join("dd"), None, 0o640).unwrap();
    (tmp, dd)
}

#[test]
fn lines_are_appended_and_deduplicated() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    dd.add_reported_to("URL=http://x/1")?;
    dd.add_reported_to("URL=http://x/2")?;
    dd.add_reported_to("URL=http://x/1")?;

    assert_eq!(
        dd.load_text("reported_to")?,
        "URL=http://x/1\nURL=http://x/2\n"
    );
    Ok(())
}

#[test]
fn duplicate_add_leaves_journal_byte_identical() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    dd.add_reported_to("Bugzilla: URL=http://bz/42")?;
    let once = dd.load_text("reported_to")?;
    dd.add_reported_to("Bugzilla: URL=http://bz/42")?;
    assert_eq!(dd.load_text("reported_to")?, once);
    Ok(())
}

#[test]
fn find_returns_most_recent_matching_line() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    dd.add_reported_to("URL=http://x/1")?;
    dd.add_reported_to("URL=http://x/2")?;

    let found = dd.find_in_reported_to("URL=")?;
    assert_eq!(
        found,
        Some(ReportResult {
            url: Some("http://x/2".to_string()),
            msg: None,
        })
    );
    Ok(())
}

#[test]
fn msg_token_consumes_the_rest_of_the_line() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    dd.add_reported_to("Bugzilla: URL=http://bz/42 MSG=duplicate of bug 41")?;

    let found = dd.find_in_reported_to("Bugzilla:")?.unwrap();
    assert_eq!(found.url.as_deref(), Some("http://bz/42"));
    assert_eq!(found.msg.as_deref(), Some("duplicate of bug 41"));
    Ok(())
}

#[test]
fn missing_journal_finds_nothing() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    assert_eq!(dd.find_in_reported_to("URL=")?, None);
    Ok(())
}

#[test]
fn unmatched_prefix_finds_nothing() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    dd.add_reported_to("Bugzilla: URL=http://bz/42")?;
    assert_eq!(dd.find_in_reported_to("Mantis:")?, None);
    Ok(())
}

#[test]
fn later_url_token_wins_within_a_line() -> probdir::Result<()> {
    let (_tmp, dd) = fresh();
    dd.add_reported_to("uploader: URL=http://a URL=http://b")?;

    let found = dd.find_in_reported_to("uploader:")?.unwrap();
    assert_eq!(found.url.as_deref(), Some("http://b"));
    Ok(())
}
