//! # edgequake-digest
//!
//! Turn a research paper (PDF) into a structured reading digest using an LLM.
//!
//! ## Why this crate?
//!
//! Asking a model "summarize this paper" gives a different shape of answer
//! every time. This crate instead asks a fixed battery of reading-comprehension
//! questions (what problem, which method, what results, what limits...),
//! re-flows the answers into one Markdown schema, then condenses them into a
//! short titled abstract. The output is one Markdown file per paper, named
//! after the abstract's title, with a running history of past digests.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Extract    text layer via pdf-extract (spawn_blocking)
//!  ├─ 3. Batches    questions grouped per strategy, one call per batch
//!  ├─ 4. Normalize  one call at temperature 0.0 into a single schema
//!  ├─ 5. Summarize  one call producing a `## ` titled abstract
//!  └─ 6. Output     Artifact (abstract + detail), atomic write, history log
//! ```
//!
//! Calls are strictly sequential. The first rate-limited or failed call
//! aborts the run; nothing is written and nothing is recorded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_digest::{digest_to_dir, DigestConfig, HistoryLedger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = DigestConfig::default();
//!     let ledger = HistoryLedger::load("digests/history.log")?;
//!     let (output, path) = digest_to_dir("paper.pdf", "digests", &config, &ledger).await?;
//!     println!("{}", output.artifact.refined_summary);
//!     eprintln!("wrote {} ({} calls)", path.display(), output.stats.generation_calls);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfdigest` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-digest = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Batching Strategy
//!
//! | Strategy | Calls for 10 questions | Trade-off |
//! |----------|------------------------|-----------|
//! | `single`  | 1 | Cheapest; long answers may get truncated |
//! | `size:5`  | 2 | Default |
//! | `count:N` | N | Spread evenly over a fixed number of calls |
//!
//! Normalization and summary add two calls to every run.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod digest;
pub mod error;
pub mod history;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod questions;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchStrategy, DigestConfig, DigestConfigBuilder, ModelTier};
pub use digest::{digest, digest_from_bytes, digest_text, digest_to_dir, persist_artifact};
pub use error::{DigestError, Stage};
pub use history::HistoryLedger;
pub use output::{Artifact, DigestOutput, DigestStats};
pub use pipeline::batch::{run_batches, RunOutcome, RunStatus};
pub use pipeline::extract::{PdfTextExtractor, TextExtractor};
pub use pipeline::llm::{GenerationClient, GenerationRequest, GenerationResult, LlmGenerationClient};
pub use progress::{DigestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::PromptTemplate;
pub use questions::{Question, QuestionSet};
