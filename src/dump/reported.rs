//! The `reported_to` journal: one line per place this problem was sent.
//!
//! Lines are free-form `KEY=value` token sequences, conventionally
//! starting with a reporter label. Only `URL=` (one token) and `MSG=`
//! (rest of the line) are interpreted.

use super::{DumpDir, LoadFlags, ITEM_REPORTED_TO};
use crate::Result;

/// Parsed journal record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportResult {
    pub url: Option<String>,
    pub msg: Option<String>,
}

fn parse_reported_line(line: &str) -> ReportResult {
    let mut result = ReportResult::default();
    let mut rest = line;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        if rest.is_empty() {
            break;
        }
        if let Some(msg) = rest.strip_prefix("MSG=") {
            // MSG= eats the entire rest of the line.
            result.msg = Some(msg.to_string());
            break;
        }
        let end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        if rest.starts_with("URL=") {
            result.url = Some(rest[4..end].to_string());
        }
        rest = &rest[end..];
    }
    result
}

impl DumpDir {
    /// Append `line` to the journal, unless an identical line is
    /// already present. Requires the lock.
    pub fn add_reported_to(&self, line: &str) -> Result<()> {
        self.require_locked()?;

        let probe = LoadFlags {
            quiet_missing: true,
            null_on_failure: true,
            follow_links: false,
        };
        let content = match self.load_text_ext(ITEM_REPORTED_TO, probe)? {
            Some(existing) => {
                if existing.split('\n').any(|l| l == line) {
                    return Ok(());
                }
                let mut content = existing;
                if !content.is_empty() && !content.ends_with('\n') {
                    content.push('\n');
                }
                content.push_str(line);
                content.push('\n');
                content
            }
            None => format!("{line}\n"),
        };
        self.save_text(ITEM_REPORTED_TO, &content)
    }

    /// Parse the most recent (last) journal line starting with `prefix`.
    /// `None` when the journal is missing or no line matches.
    pub fn find_in_reported_to(&self, prefix: &str) -> Result<Option<ReportResult>> {
        let probe = LoadFlags {
            quiet_missing: true,
            null_on_failure: true,
            follow_links: false,
        };
        let Some(journal) = self.load_text_ext(ITEM_REPORTED_TO, probe)? else {
            return Ok(None);
        };
        let found = journal
            .split('\n')
            .filter(|line| line.starts_with(prefix))
            .last();
        Ok(found.map(parse_reported_line))
    }
}
