//! CLI binary for edgequake-digest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DigestConfig`, writes the artifact and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_digest::{
    digest_to_dir, BatchStrategy, DigestConfig, DigestError, DigestProgressCallback,
    HistoryLedger, ModelTier, ProgressCallback, QuestionSet, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const QUOTA_MESSAGE: &str = "API quota exhausted — please try again later.";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one bar step per generation call (every
/// batch plus the normalization and summary passes).
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the call currently in flight.
    call_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            call_started: Mutex::new(None),
        })
    }

    fn start_call(&self) {
        *self.call_started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn elapsed(&self) -> String {
        let secs = self
            .call_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl DigestProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_batches: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>2}/{len} calls  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_batches as u64 + 2);
        self.bar.set_prefix("Digesting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Asking questions in {total_batches} batch(es)…"))
        ));
    }

    fn on_batch_start(&self, index: usize, total: usize) {
        self.start_call();
        self.bar.set_message(format!("batch {index}/{total}"));
    }

    fn on_batch_complete(&self, index: usize, total: usize, answer_len: usize) {
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {:<8}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{answer_len:>5} chars")),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, index: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            self.elapsed(),
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        // The previous call (last batch or normalization) finished.
        if stage == Stage::Summarize {
            self.bar.println(format!("  {} Normalized  {}", green("✓"), self.elapsed()));
            self.bar.inc(1);
        }
        self.start_call();
        self.bar.set_message(stage.to_string());
    }

    fn on_run_complete(&self, success: bool) {
        if success {
            self.bar.println(format!("  {} Summarized  {}", green("✓"), self.elapsed()));
            self.bar.inc(1);
        }
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Digest a paper into ./digests
  pdfdigest paper.pdf

  # From a URL, into a custom directory
  pdfdigest https://arxiv.org/pdf/1706.03762 -o notes/

  # Higher quality model, one call for all questions
  pdfdigest --model-tier quality --strategy single paper.pdf

  # Spread questions over exactly 3 calls
  pdfdigest --strategy count:3 paper.pdf

  # Custom question battery, plus 2 model-proposed questions
  pdfdigest --questions my_questions.toml --generated-questions 2 paper.pdf

  # Show the 10 most recent digests
  pdfdigest --history 10

QUESTION FILE FORMAT (TOML):
  [[questions]]
  ordinal = 1
  text = "What problem does the paper address?"

STRATEGIES:
  single     all questions in one call
  size:K     consecutive groups of K questions (default: size:5)
  count:N    N nearly equal groups

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default backend)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Digest research papers (PDF) into structured Markdown notes with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdfdigest",
    version,
    about = "Digest research papers (PDF) into structured Markdown notes with an LLM",
    long_about = "Ask a fixed battery of reading-comprehension questions about a PDF, \
normalize the answers into one Markdown schema and condense them into a titled abstract. \
Each digest is written as one Markdown file and recorded in a history log.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "history")]
    input: Option<String>,

    /// Directory the digest is written into.
    #[arg(short, long, env = "PDFDIGEST_OUTPUT_DIR", default_value = "digests")]
    output_dir: PathBuf,

    /// History log path. Default: <OUTPUT_DIR>/history.log.
    #[arg(long, env = "PDFDIGEST_HISTORY_FILE")]
    history_file: Option<PathBuf>,

    /// Print the N most recent digests (newest first) and exit.
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "10")]
    history: Option<usize>,

    /// Model tier used when --model is not set.
    #[arg(long, env = "PDFDIGEST_MODEL_TIER", value_enum, default_value = "fast")]
    model_tier: ModelTierArg,

    /// LLM model ID; overrides --model-tier.
    #[arg(long, env = "PDFDIGEST_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "PDFDIGEST_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini, openai, anthropic, azure, ollama."
    )]
    provider: Option<String>,

    /// Batching strategy: single, size:K or count:N.
    #[arg(long, env = "PDFDIGEST_STRATEGY", default_value = "size:5")]
    strategy: String,

    /// Sampling temperature for batches and summary (0.0–1.0).
    #[arg(long, env = "PDFDIGEST_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// TOML file with a custom question battery.
    #[arg(long, env = "PDFDIGEST_QUESTIONS")]
    questions: Option<PathBuf>,

    /// Ask the model to propose and answer N extra questions.
    #[arg(long, env = "PDFDIGEST_GENERATED_QUESTIONS", default_value_t = 0)]
    generated_questions: u32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDFDIGEST_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDFDIGEST_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFDIGEST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the digest and stats as JSON instead of Markdown.
    #[arg(long, env = "PDFDIGEST_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFDIGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFDIGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFDIGEST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModelTierArg {
    Fast,
    Quality,
}

impl From<ModelTierArg> for ModelTier {
    fn from(v: ModelTierArg) -> Self {
        match v {
            ModelTierArg::Fast => ModelTier::Fast,
            ModelTierArg::Quality => ModelTier::Quality,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let history_path = cli
        .history_file
        .clone()
        .unwrap_or_else(|| cli.output_dir.join("history.log"));
    let ledger = HistoryLedger::load(&history_path).context("Failed to load history log")?;

    // ── History mode ─────────────────────────────────────────────────────
    if let Some(n) = cli.history {
        print_history(&ledger, n, cli.json)?;
        return Ok(());
    }
    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("an INPUT path or URL is required");
    };

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn DigestProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    // ── Run digest ───────────────────────────────────────────────────────
    let (output, path) = match digest_to_dir(input, &cli.output_dir, &config, &ledger).await {
        Ok(done) => done,
        Err(e) => {
            // Input and extraction errors happen before the run starts and
            // leave the spinner running.
            if let Some(cb) = &cli_progress {
                cb.bar.finish_and_clear();
            }
            report_failure(e)
        }
    };

    if cli.json {
        let json = serde_json::json!({
            "path": path,
            "artifact": output.artifact,
            "stats": output.stats,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        println!("{}", output.artifact.refined_summary);
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {} calls  {}ms  →  {}",
            green("✔"),
            output.stats.generation_calls,
            output.stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
    }

    Ok(())
}

/// Print a user-facing message for a failed run and exit with status 1.
///
/// Rate limits and unreadable PDFs get their own wording; everything else
/// shows the error chain.
fn report_failure(e: DigestError) -> ! {
    if e.is_rate_limited() {
        let at = e.stage().map(|s| format!(" (at {s})")).unwrap_or_default();
        eprintln!("{} {}{}", red("✘"), QUOTA_MESSAGE, dim(&at));
    } else if e.is_parse_failure() {
        eprintln!("{} Could not read the PDF: {}", red("✘"), e);
    } else {
        eprintln!("{} {:#}", red("✘"), anyhow::Error::new(e).context("Digest failed"));
    }
    std::process::exit(1);
}

fn print_history(ledger: &HistoryLedger, n: usize, json: bool) -> Result<()> {
    let mut recent = ledger.recent(n);
    recent.reverse();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&recent).context("Failed to serialise history")?
        );
    } else if recent.is_empty() {
        eprintln!("{}", dim("No digests yet."));
    } else {
        for name in recent {
            println!("{name}");
        }
    }
    Ok(())
}

/// Map CLI args to `DigestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DigestConfig> {
    let strategy: BatchStrategy = cli
        .strategy
        .parse()
        .with_context(|| format!("Invalid --strategy '{}'", cli.strategy))?;

    let mut builder = DigestConfig::builder()
        .model_tier(cli.model_tier.into())
        .strategy(strategy)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .generated_questions(cli.generated_questions);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.questions {
        let questions = QuestionSet::load(path)
            .with_context(|| format!("Failed to load questions from {}", path.display()))?;
        builder = builder.questions(questions);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
