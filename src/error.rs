//! Error types for the edgequake-digest library.
//!
//! A digest run either produces an [`crate::output::Artifact`] or fails with
//! exactly one [`DigestError`]. There is no partial-success mode: a batch
//! that is rate limited or fails aborts the run, and nothing is persisted.
//!
//! Generation failures carry the [`Stage`] at which they happened so the
//! caller can tell "batch 2 of 3 hit the quota" apart from "the summary
//! call failed".

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where in the pipeline a generation call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    /// Question batch `index` (1-indexed) out of `total`.
    Batch { index: usize, total: usize },
    /// The Markdown normalization pass.
    Normalize,
    /// The abstract/summary pass.
    Summarize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Batch { index, total } => write!(f, "batch {index}/{total}"),
            Stage::Normalize => f.write_str("normalization"),
            Stage::Summarize => f.write_str("summary"),
        }
    }
}

/// All fatal errors returned by the edgequake-digest library.
#[derive(Debug, Error)]
pub enum DigestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Text extraction failed. No generation call has been made.
    #[error("Failed to parse PDF text: {detail}")]
    ParseFailed { detail: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The backend reported quota or rate-limit exhaustion.
    #[error("Generation quota exhausted during {stage}; try again later")]
    RateLimited { stage: Stage },

    /// Any other backend failure. `message` is the backend's own text.
    #[error("Generation failed during {stage}: {message}")]
    GenerationFailed { stage: Stage, message: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The question set is empty, has duplicate ordinals, or failed to load.
    #[error("Invalid question set: {0}")]
    InvalidQuestionSet(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or appending the history log failed.
    #[error("History log '{path}' could not be updated: {source}")]
    HistoryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the artifact file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigestError {
    /// True when the run stopped because the backend quota was exhausted.
    ///
    /// Callers use this to show a "try again later" message instead of the
    /// raw error detail.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DigestError::RateLimited { .. })
    }

    /// True when the document could not be turned into text.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            DigestError::ParseFailed { .. } | DigestError::NotAPdf { .. }
        )
    }

    /// The stage a generation error happened at, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DigestError::RateLimited { stage } | DigestError::GenerationFailed { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display_names_stage() {
        let e = DigestError::RateLimited {
            stage: Stage::Batch { index: 2, total: 3 },
        };
        let msg = e.to_string();
        assert!(msg.contains("batch 2/3"), "got: {msg}");
        assert!(e.is_rate_limited());
        assert!(!e.is_parse_failure());
    }

    #[test]
    fn generation_failed_keeps_message_verbatim() {
        let e = DigestError::GenerationFailed {
            stage: Stage::Summarize,
            message: "503 upstream overloaded".into(),
        };
        assert!(e.to_string().contains("503 upstream overloaded"));
        assert!(e.to_string().contains("summary"));
        assert_eq!(e.stage(), Some(Stage::Summarize));
    }

    #[test]
    fn parse_failure_has_no_stage() {
        let e = DigestError::ParseFailed {
            detail: "no text layer".into(),
        };
        assert!(e.is_parse_failure());
        assert_eq!(e.stage(), None);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Normalize.to_string(), "normalization");
        assert_eq!(Stage::Batch { index: 1, total: 1 }.to_string(), "batch 1/1");
    }
}
