//! Output types returned by the digest entry points.

use crate::naming::{derive_filename, format_timestamp};
use base64::Engine as _;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Separator between the abstract and the detailed Q&A in the artifact file.
pub const ARTIFACT_SEPARATOR: &str = "\n\n---\n\n";

/// The result of one completed run: an abstract plus the normalized Q&A.
///
/// Only ever built from a completed run. The file name is computed once at
/// construction from the abstract's title and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// `{YYYYMMDD_HHMMSS}_{title}.md`, see [`crate::naming`].
    pub filename: String,
    /// Titled abstract produced by the summary pass.
    pub refined_summary: String,
    /// Normalized question-and-answer text.
    pub detail_body: String,
    pub created_at: DateTime<Local>,
}

impl Artifact {
    pub fn new(
        refined_summary: impl Into<String>,
        detail_body: impl Into<String>,
        created_at: DateTime<Local>,
    ) -> Self {
        let refined_summary = refined_summary.into();
        let filename = derive_filename(&refined_summary, &format_timestamp(&created_at));
        Self {
            filename,
            refined_summary,
            detail_body: detail_body.into(),
            created_at,
        }
    }

    /// File content: the abstract, a horizontal rule, then the detail.
    pub fn content(&self) -> String {
        format!(
            "{}{}{}",
            self.refined_summary, ARTIFACT_SEPARATOR, self.detail_body
        )
    }

    /// The content as a `data:` URI, for embedding a download in HTML.
    pub fn data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.content());
        format!("data:text/markdown;base64,{encoded}")
    }

    /// An HTML anchor that downloads the artifact under its file name.
    pub fn download_link(&self) -> String {
        format!(
            r#"<a href="{}" download="{}">Download {}</a>"#,
            self.data_uri(),
            html_escape(&self.filename),
            html_escape(&self.filename)
        )
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Returned by [`crate::digest::digest`] and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestOutput {
    pub artifact: Artifact,
    pub stats: DigestStats,
}

/// Counters and timings of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestStats {
    /// Number of question batches.
    pub batches: usize,
    /// Generation calls made, including normalization and summary.
    pub generation_calls: usize,
    /// Characters of extracted document text (0 for `digest_text` callers
    /// that pass no document).
    pub source_chars: usize,
    pub extract_duration_ms: u64,
    pub batch_duration_ms: u64,
    pub normalize_duration_ms: u64,
    pub summarize_duration_ms: u64,
    pub total_duration_ms: u64,
}
