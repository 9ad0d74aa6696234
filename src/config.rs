//! Configuration types for a digest run.
//!
//! Every knob lives in [`DigestConfig`], built through
//! [`DigestConfigBuilder`]. Only three of them change the shape of a run:
//! the model, the batching strategy and the temperature. The rest are
//! collaborators (provider, extractor, progress callback) and limits.

use crate::error::DigestError;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::llm::GenerationClient;
use crate::progress::ProgressCallback;
use crate::prompts::PromptTemplate;
use crate::questions::{QuestionBatch, QuestionSet};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one digest run.
///
/// # Example
/// ```rust
/// use edgequake_digest::{BatchStrategy, DigestConfig, ModelTier};
///
/// let config = DigestConfig::builder()
///     .model_tier(ModelTier::Quality)
///     .strategy(BatchStrategy::FixedCount(2))
///     .temperature(0.3)
///     .build()
///     .unwrap();
/// assert_eq!(config.model_id(), "gemini-2.5-pro");
/// ```
#[derive(Clone)]
pub struct DigestConfig {
    /// Speed/quality trade-off used when `model` is not set. Default: Fast.
    pub model_tier: ModelTier,

    /// Explicit model identifier. Overrides `model_tier` when set.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed generation client. Takes precedence over everything
    /// provider-related; tests inject scripted clients here.
    pub client: Option<Arc<dyn GenerationClient>>,

    /// Text extractor. Defaults to [`crate::pipeline::extract::PdfTextExtractor`].
    pub extractor: Option<Arc<dyn TextExtractor>>,

    /// How questions are grouped into generation calls. Default: `FixedSize(5)`.
    ///
    /// Fewer, larger batches spend less quota; smaller batches give the
    /// model less to juggle per answer.
    pub strategy: BatchStrategy,

    /// Sampling temperature for batch and summary calls, in [0, 1]. Default: 0.2.
    ///
    /// The normalization pass always runs at 0.0.
    pub temperature: f32,

    /// Maximum tokens per generation call. Default: 8192.
    pub max_tokens: usize,

    /// Per-call deadline in seconds; a timeout surfaces as a failure. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// The questions to ask. Default: the ten-question research battery.
    pub questions: QuestionSet,

    /// Directives embedded in every batch prompt.
    pub prompt_template: PromptTemplate,

    /// Extra questions the model proposes and answers itself in the last
    /// batch. Default: 0.
    pub generated_questions: u32,

    /// Upper bound on the abstract length, in words. Default: 500.
    pub summary_word_limit: usize,

    /// Receives per-batch and per-stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            model_tier: ModelTier::default(),
            model: None,
            provider_name: None,
            provider: None,
            client: None,
            extractor: None,
            strategy: BatchStrategy::default(),
            temperature: 0.2,
            max_tokens: 8192,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            questions: QuestionSet::default(),
            prompt_template: PromptTemplate::default(),
            generated_questions: 0,
            summary_word_limit: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DigestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestConfig")
            .field("model_tier", &self.model_tier)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn GenerationClient>"))
            .field("strategy", &self.strategy)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("questions", &self.questions.len())
            .field("generated_questions", &self.generated_questions)
            .field("summary_word_limit", &self.summary_word_limit)
            .finish()
    }
}

impl DigestConfig {
    /// Create a new builder for `DigestConfig`.
    pub fn builder() -> DigestConfigBuilder {
        DigestConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model identifier sent with every generation request.
    pub fn model_id(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.model_tier.default_model())
    }
}

/// Builder for [`DigestConfig`].
pub struct DigestConfigBuilder {
    config: DigestConfig,
}

impl fmt::Debug for DigestConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DigestConfigBuilder {
    pub fn model_tier(mut self, tier: ModelTier) -> Self {
        self.config.model_tier = tier;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn client(mut self, client: Arc<dyn GenerationClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn strategy(mut self, strategy: BatchStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn questions(mut self, questions: QuestionSet) -> Self {
        self.config.questions = questions;
        self
    }

    pub fn prompt_template(mut self, template: PromptTemplate) -> Self {
        self.config.prompt_template = template;
        self
    }

    pub fn generated_questions(mut self, n: u32) -> Self {
        self.config.generated_questions = n;
        self
    }

    pub fn summary_word_limit(mut self, words: usize) -> Self {
        self.config.summary_word_limit = words;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DigestConfig, DigestError> {
        let c = &self.config;
        match c.strategy {
            BatchStrategy::FixedSize(0) => {
                return Err(DigestError::InvalidConfig(
                    "fixed-size batches need at least 1 question each".into(),
                ))
            }
            BatchStrategy::FixedCount(0) => {
                return Err(DigestError::InvalidConfig(
                    "fixed-count needs at least 1 batch".into(),
                ))
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&c.temperature) {
            return Err(DigestError::InvalidConfig(format!(
                "temperature must be 0.0–1.0, got {}",
                c.temperature
            )));
        }
        if c.max_tokens == 0 {
            return Err(DigestError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(DigestError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.summary_word_limit == 0 {
            return Err(DigestError::InvalidConfig(
                "summary_word_limit must be ≥ 1".into(),
            ));
        }
        if c.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(DigestError::InvalidConfig("model id is empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which class of backend model to use.
///
/// | Tier | Model | Notes |
/// |------|-------|-------|
/// | Fast | `gemini-2.0-flash` | Recommended; quick and cheap |
/// | Quality | `gemini-2.5-pro` | Better prose, slower, hits quota sooner |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelTier {
    #[default]
    Fast,
    Quality,
}

impl ModelTier {
    pub fn default_model(self) -> &'static str {
        match self {
            ModelTier::Fast => "gemini-2.0-flash",
            ModelTier::Quality => "gemini-2.5-pro",
        }
    }
}

/// How the question set is split into generation calls.
///
/// Every strategy yields non-empty, contiguous batches in ordinal order
/// whose concatenation is exactly the question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStrategy {
    /// One call with every question.
    Single,
    /// Consecutive groups of `k`; the last group may be smaller.
    FixedSize(usize),
    /// `n` contiguous groups whose sizes differ by at most one.
    ///
    /// When `n` exceeds the number of questions each question gets its own
    /// batch.
    FixedCount(usize),
}

impl Default for BatchStrategy {
    fn default() -> Self {
        BatchStrategy::FixedSize(5)
    }
}

impl BatchStrategy {
    /// Split `set` into batches.
    pub fn partition<'a>(&self, set: &'a QuestionSet) -> Vec<QuestionBatch<'a>> {
        let questions = set.questions();
        if questions.is_empty() {
            return Vec::new();
        }
        match *self {
            BatchStrategy::Single => vec![QuestionBatch::new(questions)],
            BatchStrategy::FixedSize(k) => questions
                .chunks(k.max(1))
                .map(QuestionBatch::new)
                .collect(),
            BatchStrategy::FixedCount(n) => {
                let n = n.clamp(1, questions.len());
                let base = questions.len() / n;
                let extra = questions.len() % n;
                let mut batches = Vec::with_capacity(n);
                let mut start = 0;
                for i in 0..n {
                    let size = base + usize::from(i < extra);
                    batches.push(QuestionBatch::new(&questions[start..start + size]));
                    start += size;
                }
                batches
            }
        }
    }
}

impl fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStrategy::Single => f.write_str("single"),
            BatchStrategy::FixedSize(k) => write!(f, "size:{k}"),
            BatchStrategy::FixedCount(n) => write!(f, "count:{n}"),
        }
    }
}

impl FromStr for BatchStrategy {
    type Err = DigestError;

    /// Accepts `single`, `size:K` and `count:N` (also `fixed-size(K)` and
    /// `fixed-count(N)`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "single" {
            return Ok(BatchStrategy::Single);
        }

        let parse_n = |raw: &str| -> Result<usize, DigestError> {
            let n: usize = raw.trim().parse().map_err(|_| {
                DigestError::InvalidConfig(format!("invalid batch parameter '{raw}'"))
            })?;
            if n == 0 {
                return Err(DigestError::InvalidConfig(
                    "batch parameter must be ≥ 1".into(),
                ));
            }
            Ok(n)
        };

        if let Some(k) = s
            .strip_prefix("size:")
            .or_else(|| call_argument(&s, "fixed-size"))
        {
            return Ok(BatchStrategy::FixedSize(parse_n(k)?));
        }
        if let Some(n) = s
            .strip_prefix("count:")
            .or_else(|| call_argument(&s, "fixed-count"))
        {
            return Ok(BatchStrategy::FixedCount(parse_n(n)?));
        }

        Err(DigestError::InvalidConfig(format!(
            "unknown batch strategy '{s}' (expected single, size:K or count:N)"
        )))
    }
}

/// `name(arg)` → `arg`.
fn call_argument<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')
}
