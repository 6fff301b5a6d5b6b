use std::fs;

use probdir::logging::{init_logging, LogFormat, LogSink, LoggingConfig};
use probdir::DumpDir;
use tempfile::tempdir;

#[test]
fn init_logging_writes_library_diagnostics_to_file() -> probdir::Result<()> {
    let tmp = tempdir()?;
    let log_path = tmp.path().join("logs/probdir.log");

    init_logging(LoggingConfig {
        format: LogFormat::Human,
        sink: LogSink::File(log_path.clone()),
        // Fixed "trace" filter, so an inherited RUST_LOG can't hide the
        // event asserted below.
        debug: true,
    })?;
    assert!(log_path.exists(), "missing parents are created for the sink");

    // Repeated initialization is a no-op, not an error.
    init_logging(LoggingConfig::default())?;

    // Provoke a diagnostic: loading a missing item without the quiet
    // flag warns about the failed open.
    let dd = DumpDir::create(tmp.path().join("dd"), None, 0o640)?;
    assert_eq!(dd.load_text("absent")?, "");

    let logged = fs::read_to_string(&log_path)?;
    assert!(
        logged.contains("can't open file"),
        "expected the failed-open warning in the log, got: {logged:?}"
    );
    Ok(())
}
