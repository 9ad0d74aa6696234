//! Top-level digest entry points.
//!
//! A run is strictly sequential:
//!
//! ```text
//! resolve ─▶ extract ─▶ batch 1..n ─▶ normalize ─▶ summarize ─▶ Artifact
//! ```
//!
//! Any failure stops the run. Nothing is written to disk or to the history
//! ledger unless every stage succeeded; [`persist_artifact`] is only ever
//! handed a finished [`Artifact`].

use crate::config::DigestConfig;
use crate::error::{DigestError, Stage};
use crate::history::HistoryLedger;
use crate::output::{Artifact, DigestOutput, DigestStats};
use crate::pipeline::batch::run_batches;
use crate::pipeline::extract::{PdfTextExtractor, TextExtractor};
use crate::pipeline::input::{self, check_pdf_magic};
use crate::pipeline::llm::{GenerationClient, LlmGenerationClient};
use crate::pipeline::normalize::normalize;
use crate::pipeline::summarize::summarize;
use chrono::Local;
use edgequake_llm::ProviderFactory;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Digest a PDF file or URL.
///
/// # Errors
/// Input and extraction errors are returned before any generation call.
/// A rate-limited or failed generation call at any stage aborts the run
/// with [`DigestError::RateLimited`] or [`DigestError::GenerationFailed`].
pub async fn digest(
    input_str: impl AsRef<str>,
    config: &DigestConfig,
) -> Result<DigestOutput, DigestError> {
    let input_str = input_str.as_ref();
    info!("Starting digest: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    digest_from_bytes(&resolved.bytes, config).await
}

/// Digest PDF bytes already in memory.
///
/// # Example
/// ```rust,no_run
/// use edgequake_digest::{digest_from_bytes, DigestConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("paper.pdf")?;
/// let output = digest_from_bytes(&bytes, &DigestConfig::default()).await?;
/// println!("{}", output.artifact.refined_summary);
/// # Ok(())
/// # }
/// ```
pub async fn digest_from_bytes(
    bytes: &[u8],
    config: &DigestConfig,
) -> Result<DigestOutput, DigestError> {
    let total_start = Instant::now();
    check_pdf_magic("<bytes>", bytes)?;

    let extract_start = Instant::now();
    let text = match &config.extractor {
        Some(extractor) => extractor.extract(bytes).await?,
        None => PdfTextExtractor.extract(bytes).await?,
    };
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} chars in {}ms",
        text.chars().count(),
        extract_duration_ms
    );

    let mut output = digest_text(&text, config).await?;
    output.stats.extract_duration_ms = extract_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Digest already-extracted document text.
///
/// Runs the batches, the normalization pass and the summary pass, and
/// builds the [`Artifact`] stamped with the current local time. Nothing is
/// persisted; see [`persist_artifact`] and [`digest_to_dir`].
pub async fn digest_text(text: &str, config: &DigestConfig) -> Result<DigestOutput, DigestError> {
    let client = resolve_client(config)?;
    let result = run_pipeline(client.as_ref(), text, config).await;

    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(result.is_ok());
    }
    match &result {
        Ok(output) => info!(
            "Digest complete: {} in {} call(s), {}ms",
            output.artifact.filename, output.stats.generation_calls, output.stats.total_duration_ms
        ),
        Err(e) => warn!("Digest aborted: {}", e),
    }
    result
}

/// Digest `input_str` and persist the artifact into `output_dir`.
///
/// Returns the output together with the path written. The ledger is only
/// touched after the file is in place.
pub async fn digest_to_dir(
    input_str: impl AsRef<str>,
    output_dir: impl AsRef<Path>,
    config: &DigestConfig,
    ledger: &HistoryLedger,
) -> Result<(DigestOutput, PathBuf), DigestError> {
    let output = digest(input_str, config).await?;
    let path = persist_artifact(&output.artifact, output_dir, ledger).await?;
    Ok((output, path))
}

/// Write `artifact` into `output_dir` and record its name in `ledger`.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a partial
/// artifact behind. An existing file is never replaced: if the derived name
/// is taken (two runs in the same second), the artifact lands under
/// `<stem>-2.md`, `<stem>-3.md`, and so on. The returned path and the ledger
/// entry carry the name actually written. A write failure leaves the ledger
/// unchanged.
pub async fn persist_artifact(
    artifact: &Artifact,
    output_dir: impl AsRef<Path>,
    ledger: &HistoryLedger,
) -> Result<PathBuf, DigestError> {
    let dir = output_dir.as_ref().to_path_buf();
    let requested = dir.join(&artifact.filename);
    let filename = artifact.filename.clone();
    let content = artifact.content();

    let path = tokio::task::spawn_blocking(move || {
        write_atomically(&dir, &filename, content.as_bytes())
    })
    .await
    .map_err(|e| DigestError::Internal(format!("artifact writer aborted: {e}")))?
    .map_err(|source| DigestError::OutputWriteFailed {
        path: requested,
        source,
    })?;
    debug!("Wrote artifact {}", path.display());

    let written = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.filename.clone());
    ledger.record(&written)?;
    Ok(path)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_pipeline(
    client: &dyn GenerationClient,
    text: &str,
    config: &DigestConfig,
) -> Result<DigestOutput, DigestError> {
    let total_start = Instant::now();
    let model = config.model_id();
    let progress = config.progress_callback.as_deref();

    // ── Step 1: Question batches ─────────────────────────────────────────
    let batch_start = Instant::now();
    let outcome = run_batches(client, text, config).await;
    let batches = outcome.total_batches;
    let mut calls = outcome.calls;
    let answers = outcome.into_result()?;
    let batch_duration_ms = batch_start.elapsed().as_millis() as u64;

    // ── Step 2: Normalize ────────────────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Normalize);
    }
    let normalize_start = Instant::now();
    calls += 1;
    let detail = normalize(client, &answers, model)
        .await
        .into_stage_result(Stage::Normalize)?;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;

    // ── Step 3: Summarize ────────────────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Summarize);
    }
    let summarize_start = Instant::now();
    calls += 1;
    let summary = summarize(
        client,
        &detail,
        model,
        config.temperature,
        config.summary_word_limit,
    )
    .await
    .into_stage_result(Stage::Summarize)?;
    let summarize_duration_ms = summarize_start.elapsed().as_millis() as u64;

    let artifact = Artifact::new(summary, detail, Local::now());
    let stats = DigestStats {
        batches,
        generation_calls: calls,
        source_chars: text.chars().count(),
        extract_duration_ms: 0,
        batch_duration_ms,
        normalize_duration_ms,
        summarize_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    Ok(DigestOutput { artifact, stats })
}

/// Highest `-N` suffix tried before giving up on a taken name.
const MAX_NAME_SUFFIX: u32 = 999;

/// `name` for the first attempt, then `stem-2.ext`, `stem-3.ext`, ...
fn suffixed_name(name: &str, attempt: u32) -> String {
    if attempt <= 1 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{attempt}.{ext}"),
        None => format!("{name}-{attempt}"),
    }
}

/// Write `bytes` under `dir/filename` without replacing an existing file.
fn write_atomically(dir: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    for attempt in 1..=MAX_NAME_SUFFIX {
        let target = dir.join(suffixed_name(filename, attempt));
        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(e.error),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("every name up to {} is taken", suffixed_name(filename, MAX_NAME_SUFFIX)),
    ))
}

/// Resolve the generation client, from most-specific to least-specific:
///
/// 1. **Pre-built client** (`config.client`), used as-is. Tests inject
///    scripted clients here.
/// 2. **Pre-built provider** (`config.provider`), wrapped as-is.
/// 3. **Named provider** (`config.provider_name`) with the configured model.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **Gemini key** (`GEMINI_API_KEY` or `GOOGLE_API_KEY`) with the
///    configured model, since the model tiers are Gemini models.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_client(config: &DigestConfig) -> Result<Arc<dyn GenerationClient>, DigestError> {
    if let Some(client) = &config.client {
        return Ok(Arc::clone(client));
    }

    let timeout = Duration::from_secs(config.api_timeout_secs);
    let model = config.model_id();

    if let Some(provider) = &config.provider {
        return Ok(Arc::new(LlmGenerationClient::with_provider(
            Arc::clone(provider),
            config.max_tokens,
            timeout,
        )));
    }

    if let Some(name) = &config.provider_name {
        return Ok(Arc::new(LlmGenerationClient::named(
            name.as_str(),
            model,
            config.max_tokens,
            timeout,
        )?));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            // An explicit model in the config still wins over the env model.
            let model = config.model.as_deref().unwrap_or(&env_model);
            return Ok(Arc::new(LlmGenerationClient::named(
                prov,
                model,
                config.max_tokens,
                timeout,
            )?));
        }
    }

    let has_gemini_key = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .any(|k| std::env::var(k).is_ok_and(|v| !v.is_empty()));
    if has_gemini_key {
        return Ok(Arc::new(LlmGenerationClient::named(
            "gemini",
            model,
            config.max_tokens,
            timeout,
        )?));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DigestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(LlmGenerationClient::with_provider(
        llm_provider,
        config.max_tokens,
        timeout,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{GenerationRequest, GenerationResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Canned {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationClient for Canned {
        async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if request.temperature == 0.0 {
                GenerationResult::Success("**❓ 問題 1：**\n**🤖 回答：** ok".into())
            } else if request.source_text.starts_with("**❓") {
                GenerationResult::Success("## 🧪 A Study\n\nShort abstract.".into())
            } else {
                GenerationResult::Success(format!("ANSWER_{n}"))
            }
        }
    }

    fn config_with(client: Arc<dyn GenerationClient>) -> DigestConfig {
        DigestConfig::builder()
            .client(client)
            .strategy(crate::config::BatchStrategy::Single)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn digest_text_counts_every_call() {
        let client = Arc::new(Canned {
            calls: AtomicUsize::new(0),
        });
        let config = config_with(client.clone());
        let out = digest_text("document", &config).await.unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.stats.batches, 1);
        assert_eq!(out.stats.generation_calls, 3);
        assert!(out.artifact.filename.ends_with("_A-Study.md"));
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_before_generation() {
        let client = Arc::new(Canned {
            calls: AtomicUsize::new(0),
        });
        let config = config_with(client.clone());
        let err = digest_from_bytes(b"<html></html>", &config).await.unwrap_err();

        assert!(matches!(err, DigestError::NotAPdf { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persist_writes_content_then_records() {
        let dir = TempDir::new().unwrap();
        let ledger = HistoryLedger::load(dir.path().join("history.log")).unwrap();
        let artifact = Artifact::new("## Title", "detail", Local::now());

        let path = persist_artifact(&artifact, dir.path().join("out"), &ledger)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "## Title\n\n---\n\ndetail");
        assert_eq!(ledger.recent(1), vec![artifact.filename.clone()]);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn same_second_artifacts_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let ledger = HistoryLedger::load(dir.path().join("history.log")).unwrap();
        let at = Local::now();
        let first = Artifact::new("## A Study", "FIRST RUN BODY", at);
        let second = Artifact::new("## A Study", "SECOND RUN BODY", at);
        assert_eq!(first.filename, second.filename);

        let first_path = persist_artifact(&first, &out, &ledger).await.unwrap();
        let second_path = persist_artifact(&second, &out, &ledger).await.unwrap();

        assert_ne!(first_path, second_path);
        assert!(std::fs::read_to_string(&first_path)
            .unwrap()
            .ends_with("FIRST RUN BODY"));
        assert!(std::fs::read_to_string(&second_path)
            .unwrap()
            .ends_with("SECOND RUN BODY"));

        let second_name = second_path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(second_name, first.filename.replace(".md", "-2.md"));
        assert_eq!(ledger.entries(), vec![first.filename.clone(), second_name]);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn suffixed_name_goes_before_extension() {
        assert_eq!(suffixed_name("20240101_120000_X.md", 1), "20240101_120000_X.md");
        assert_eq!(suffixed_name("20240101_120000_X.md", 2), "20240101_120000_X-2.md");
        assert_eq!(suffixed_name("plain", 3), "plain-3");
    }
}
