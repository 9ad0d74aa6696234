//! Whole-pipeline integration tests.
//!
//! Every test drives the public API with a scripted [`GenerationClient`]
//! and a stub [`TextExtractor`]; artifacts and the history log live in a
//! [`TempDir`]. No network access is needed.

use async_trait::async_trait;
use edgequake_digest::prompts::{question_marker, summary_instructions, ANSWER_MARKER};
use edgequake_digest::{
    digest_to_dir, BatchStrategy, DigestConfig, DigestError, GenerationClient, GenerationRequest,
    GenerationResult, HistoryLedger, Question, QuestionSet, Stage, TextExtractor,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const SUMMARY: &str = "## 📄 Stub Paper: A Study!\n\nA short abstract.";

#[derive(Clone, Copy, Debug)]
enum Fault {
    Fail,
    RateLimit,
}

/// Answers every question it is asked, echoes the normalization input and
/// returns a fixed abstract. Optionally faults on one call (0-indexed).
struct StubClient {
    calls: AtomicUsize,
    fault: Option<(usize, Fault)>,
    kinds: Mutex<Vec<&'static str>>,
}

impl StubClient {
    fn new() -> Arc<Self> {
        Self::faulting(None)
    }

    fn faulting(fault: Option<(usize, Fault)>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fault,
            kinds: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn kinds(&self) -> Vec<&'static str> {
        self.kinds.lock().unwrap().clone()
    }
}

/// Ordinals listed in a batch prompt as `N. **text**`.
fn asked_ordinals(instructions: &str) -> Vec<u32> {
    instructions
        .lines()
        .filter_map(|line| line.split_once(". **"))
        .filter_map(|(n, _)| n.trim().parse().ok())
        .collect()
}

#[async_trait]
impl GenerationClient for StubClient {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let kind = if request.temperature == 0.0 {
            "normalize"
        } else if request.instructions == summary_instructions(500) {
            "summarize"
        } else {
            "batch"
        };
        self.kinds.lock().unwrap().push(kind);

        match self.fault {
            Some((at, Fault::Fail)) if at == n => {
                return GenerationResult::Failure(format!("stub failure on call {n}"))
            }
            Some((at, Fault::RateLimit)) if at == n => return GenerationResult::RateLimited,
            _ => {}
        }

        match kind {
            "normalize" => GenerationResult::Success(request.source_text.to_string()),
            "summarize" => GenerationResult::Success(SUMMARY.to_string()),
            _ => GenerationResult::Success(
                asked_ordinals(request.instructions)
                    .into_iter()
                    .map(|o| format!("{}\n{} ANSWER_{o}", question_marker(o), ANSWER_MARKER))
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
        }
    }
}

struct StubExtractor {
    result: Result<&'static str, &'static str>,
}

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract(&self, _bytes: &[u8]) -> Result<String, DigestError> {
        self.result
            .map(str::to_string)
            .map_err(|detail| DigestError::ParseFailed {
                detail: detail.to_string(),
            })
    }
}

fn eight_questions() -> QuestionSet {
    QuestionSet::new(
        (1..=8)
            .map(|i| Question::new(i, format!("Question number {i}?")))
            .collect(),
    )
    .unwrap()
}

fn config(client: Arc<StubClient>, strategy: BatchStrategy) -> DigestConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();

    DigestConfig::builder()
        .client(client)
        .extractor(Arc::new(StubExtractor {
            result: Ok("Extracted paper text."),
        }))
        .questions(eight_questions())
        .strategy(strategy)
        .build()
        .unwrap()
}

struct Workspace {
    _dir: TempDir,
    pdf: PathBuf,
    out: PathBuf,
    ledger: HistoryLedger,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let pdf = dir.path().join("paper.pdf");
    std::fs::write(&pdf, b"%PDF-1.4\n% stub document\n").unwrap();
    let out = dir.path().join("digests");
    let ledger = HistoryLedger::load(out.join("history.log")).unwrap();
    Workspace {
        _dir: dir,
        pdf,
        out,
        ledger,
    }
}

fn markdown_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".md"))
        .collect();
    names.sort();
    names
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn eight_questions_in_two_batches_take_four_calls() {
    let ws = workspace();
    let client = StubClient::new();
    let config = config(client.clone(), BatchStrategy::FixedCount(2));

    let (output, path) = digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
        .await
        .unwrap();

    assert_eq!(client.calls(), 4);
    assert_eq!(client.kinds(), vec!["batch", "batch", "normalize", "summarize"]);
    assert_eq!(output.stats.batches, 2);
    assert_eq!(output.stats.generation_calls, 4);

    assert!(output.artifact.filename.ends_with("_Stub-Paper-A-Study.md"));
    assert_eq!(path, ws.out.join(&output.artifact.filename));
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, format!("{SUMMARY}\n\n---\n\n{}", output.artifact.detail_body));
    assert_eq!(ws.ledger.entries(), vec![output.artifact.filename.clone()]);
}

#[tokio::test]
async fn any_failed_call_leaves_no_trace() {
    for at in 0..4 {
        for fault in [Fault::Fail, Fault::RateLimit] {
            let ws = workspace();
            let client = StubClient::faulting(Some((at, fault)));
            let config = config(client.clone(), BatchStrategy::FixedCount(2));

            let err = digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
                .await
                .unwrap_err();

            assert_eq!(client.calls(), at + 1, "call {at} {fault:?}: no call after the fault");
            assert!(ws.ledger.is_empty(), "call {at} {fault:?}");
            assert!(markdown_files(&ws.out).is_empty(), "call {at} {fault:?}");

            let expected_stage = match at {
                0 | 1 => Stage::Batch {
                    index: at + 1,
                    total: 2,
                },
                2 => Stage::Normalize,
                _ => Stage::Summarize,
            };
            assert_eq!(err.stage(), Some(expected_stage));
            match fault {
                Fault::RateLimit => assert!(err.is_rate_limited()),
                Fault::Fail => assert!(
                    matches!(&err, DigestError::GenerationFailed { message, .. }
                        if message == &format!("stub failure on call {at}"))
                ),
            }

            let reloaded = HistoryLedger::load(ws.out.join("history.log")).unwrap();
            assert!(reloaded.is_empty());
        }
    }
}

#[tokio::test]
async fn rate_limit_on_second_of_three_batches() {
    let ws = workspace();
    let client = StubClient::faulting(Some((1, Fault::RateLimit)));
    let config = config(client.clone(), BatchStrategy::FixedCount(3));

    let err = digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
        .await
        .unwrap_err();

    assert_eq!(client.calls(), 2);
    assert!(matches!(
        err,
        DigestError::RateLimited {
            stage: Stage::Batch { index: 2, total: 3 }
        }
    ));
}

#[tokio::test]
async fn every_strategy_yields_one_answer_slot_per_ordinal() {
    let strategies = [
        BatchStrategy::Single,
        BatchStrategy::FixedSize(3),
        BatchStrategy::FixedSize(8),
        BatchStrategy::FixedCount(3),
        BatchStrategy::FixedCount(20),
    ];
    for strategy in strategies {
        let ws = workspace();
        let config = config(StubClient::new(), strategy);
        let (output, _) = digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
            .await
            .unwrap();

        let detail = &output.artifact.detail_body;
        let mut last_pos = 0;
        for o in 1..=8 {
            let marker = question_marker(o);
            assert_eq!(detail.matches(&marker).count(), 1, "{strategy}: ordinal {o}");
            let answer = format!("ANSWER_{o}");
            assert_eq!(detail.matches(&answer).count(), 1, "{strategy}: answer {o}");
            let pos = detail.find(&marker).unwrap();
            assert!(pos >= last_pos, "{strategy}: ordinal {o} out of order");
            last_pos = pos;
        }
    }
}

#[tokio::test]
async fn parse_failure_makes_no_generation_call() {
    let ws = workspace();
    let client = StubClient::new();
    let config = DigestConfig::builder()
        .client(client.clone())
        .extractor(Arc::new(StubExtractor {
            result: Err("no text layer"),
        }))
        .build()
        .unwrap();

    let err = digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
        .await
        .unwrap_err();

    assert!(err.is_parse_failure());
    assert_eq!(client.calls(), 0);
    assert!(ws.ledger.is_empty());
}

#[tokio::test]
async fn non_pdf_input_is_rejected_before_extraction() {
    let ws = workspace();
    let html = ws.out.with_file_name("page.html");
    std::fs::write(&html, b"<!doctype html>").unwrap();
    let client = StubClient::new();
    let config = config(client.clone(), BatchStrategy::Single);

    let err = digest_to_dir(html.to_str().unwrap(), &ws.out, &config, &ws.ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, DigestError::NotAPdf { .. }));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn back_to_back_reruns_keep_both_artifacts() {
    let ws = workspace();
    let config = config(StubClient::new(), BatchStrategy::FixedSize(5));

    // No pause between runs: both usually land in the same second.
    let (first, first_path) = digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
        .await
        .unwrap();
    let (second, second_path) =
        digest_to_dir(ws.pdf.to_str().unwrap(), &ws.out, &config, &ws.ledger)
            .await
            .unwrap();

    let (a, b) = (&first.artifact, &second.artifact);
    // `YYYYMMDD_HHMMSS_` is 16 bytes.
    assert_eq!(a.filename[16..], b.filename[16..]);
    assert_eq!(a.content(), b.content());

    assert_ne!(first_path, second_path);
    assert_eq!(std::fs::read_to_string(&first_path).unwrap(), a.content());
    assert_eq!(std::fs::read_to_string(&second_path).unwrap(), b.content());

    let name = |p: &Path| p.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(markdown_files(&ws.out).len(), 2);
    assert_eq!(ws.ledger.recent(5), vec![name(first_path.as_path()), name(second_path.as_path())]);
}
