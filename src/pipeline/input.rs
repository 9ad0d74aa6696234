//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! Local files and HTTP(S) URLs are both accepted. The `%PDF` magic bytes
//! are checked before anything is handed to the extractor so a mislabelled
//! HTML page or image fails with [`DigestError::NotAPdf`] instead of a
//! confusing parse error.

use crate::error::DigestError;
use std::path::Path;
use tracing::{debug, info};

/// PDF bytes plus a display name for logs and errors.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// File name (local) or last URL path segment (download).
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, DigestError> {
    if input.trim().is_empty() {
        return Err(DigestError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Fail with [`DigestError::NotAPdf`] unless `bytes` start with `%PDF`.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), DigestError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(DigestError::NotAPdf {
        source_name: name.to_string(),
        magic,
    })
}

async fn read_local(path: &Path) -> Result<ResolvedInput, DigestError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DigestError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DigestError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    check_pdf_magic(&name, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, DigestError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DigestError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DigestError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DigestError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DigestError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DigestError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let name = filename_from_url(url);
    check_pdf_magic(&name, &bytes)?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(ResolvedInput { name, bytes })
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}
