//! Document text extraction.
//!
//! Extraction happens once, before any generation call. A failure here
//! stops the run with [`DigestError::ParseFailed`] and nothing is sent to
//! the backend.

use crate::error::DigestError;
use async_trait::async_trait;
use tracing::debug;

/// Converts an uploaded document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<String, DigestError>;
}

/// Extracts the text layer of a PDF with `pdf-extract`.
///
/// Scanned PDFs without a text layer yield no text and are reported as a
/// parse failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, DigestError> {
        let owned = bytes.to_vec();
        // pdf-extract is CPU-bound and synchronous, and panics on some
        // malformed files; a panic is reported as a parse failure.
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
            .await
            .map_err(|e| DigestError::ParseFailed {
                detail: format!("PDF parser aborted: {e}"),
            })?
            .map_err(|e| DigestError::ParseFailed {
                detail: e.to_string(),
            })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(DigestError::ParseFailed {
                detail: "the PDF has no extractable text layer".to_string(),
            });
        }
        debug!("Extracted {} chars of text", text.chars().count());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_fail_to_parse() {
        let err = PdfTextExtractor
            .extract(b"%PDF-1.4\nthis is not really a pdf")
            .await
            .unwrap_err();
        assert!(err.is_parse_failure(), "got: {err}");
    }

    #[test]
    fn empty_input_fails_to_parse() {
        let result = tokio_test::block_on(PdfTextExtractor.extract(b""));
        assert!(matches!(result, Err(DigestError::ParseFailed { .. })));
    }
}
