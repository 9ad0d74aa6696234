//! Artifact file names derived from the abstract's title line.
//!
//! `## 😴 研究摘要！` written at 2024-01-01 12:00:00 becomes
//! `20240101_120000_研究摘要.md`: the heading marker, emoji and punctuation
//! go, letters in any script stay. The result never contains a path
//! separator, whitespace or a control character.

use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

/// `chrono` format of the sortable timestamp prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Longest title kept in a file name, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

static RE_SEPARATOR_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s-]+").unwrap());

/// Format `at` as `YYYYMMDD_HHMMSS`.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The title candidate: the first line with its heading marker removed.
///
/// Returns `None` when the first line is blank.
pub fn extract_title(summary: &str) -> Option<&str> {
    let first = summary.trim_start_matches('\u{FEFF}').lines().next()?;
    let title = first.trim().trim_start_matches('#').trim();
    (!title.is_empty()).then_some(title)
}

/// Reduce `raw` to a file-name-safe slug.
///
/// Keeps letters, digits, `_`, whitespace and `-`; turns every run of
/// whitespace and hyphens into one `-`; trims `-`/`_` from both ends and
/// caps the length. `sanitize_title(sanitize_title(x)) == sanitize_title(x)`.
pub fn sanitize_title(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();
    let collapsed = RE_SEPARATOR_RUNS.replace_all(&kept, "-");
    let trimmed = trim_separators(&collapsed);
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    trim_separators(&cut).to_string()
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c| c == '-' || c == '_')
}

/// `{timestamp}_{title}.md`, or `{timestamp}.md` when the summary has no
/// usable title.
pub fn derive_filename(summary: &str, timestamp: &str) -> String {
    let title = extract_title(summary).map(sanitize_title).unwrap_or_default();
    if title.is_empty() {
        format!("{timestamp}.md")
    } else {
        format!("{timestamp}_{title}.md")
    }
}
