//! Generation backend contract and its edgequake-llm implementation.
//!
//! Everything above this module sees backend calls only through
//! [`GenerationClient::generate`] and its tagged [`GenerationResult`]. This
//! is the one place that looks at backend errors: [`classify_llm_error`]
//! turns a provider error into `RateLimited` or `Failure`, so callers never
//! inspect response strings to find out whether a call worked.
//!
//! Exactly one backend call per `generate`. No retries: a retried batch
//! spends quota twice, and the caller would rather abort and tell the user
//! to come back later.

use crate::error::{DigestError, Stage};
use crate::prompts::compose_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One generation call. Built fresh per call and never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRequest<'a> {
    /// The document (or previous pass output) the instructions apply to.
    pub source_text: &'a str,
    pub instructions: &'a str,
    pub model: &'a str,
    /// Sampling temperature in [0, 1].
    pub temperature: f32,
}

impl<'a> GenerationRequest<'a> {
    /// Build a request, clamping `temperature` into [0, 1].
    pub fn new(source_text: &'a str, instructions: &'a str, model: &'a str, temperature: f32) -> Self {
        Self {
            source_text,
            instructions,
            model,
            temperature: if temperature.is_nan() {
                0.0
            } else {
                temperature.clamp(0.0, 1.0)
            },
        }
    }
}

/// Outcome of a single generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// The backend returned text.
    Success(String),
    /// Quota or rate limit exhausted.
    RateLimited,
    /// Any other error; the backend's message is preserved.
    Failure(String),
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success(_))
    }

    /// Turn the result into the pipeline's error type, tagging the stage.
    pub fn into_stage_result(self, stage: Stage) -> Result<String, DigestError> {
        match self {
            GenerationResult::Success(text) => Ok(text),
            GenerationResult::RateLimited => Err(DigestError::RateLimited { stage }),
            GenerationResult::Failure(message) => {
                Err(DigestError::GenerationFailed { stage, message })
            }
        }
    }
}

/// A text-generation backend.
///
/// Implementations make exactly one backend call per `generate` and must
/// classify the outcome themselves. Timeouts, if any, surface as
/// [`GenerationResult::Failure`].
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult;
}

// ── Error classification ─────────────────────────────────────────────────

/// Phrases (lowercase) that mark an untyped provider error as quota exhaustion.
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "quota",
    "resource exhausted",
    "resource_exhausted",
    "resourceexhausted",
    "too many requests",
];

/// HTTP 429 as a standalone number, not a digit run inside a larger one.
static RE_STATUS_429: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b429\b").unwrap());

/// Classify a provider error.
///
/// Typed variants decide on their own. Only the catch-all variants, where
/// providers put raw HTTP bodies, fall back to [`classify_error`].
pub fn classify_llm_error(error: &LlmError) -> GenerationResult {
    match error {
        LlmError::RateLimited(_) => GenerationResult::RateLimited,
        LlmError::ApiError(msg)
        | LlmError::ProviderError(msg)
        | LlmError::NetworkError(msg)
        | LlmError::Unknown(msg) => match classify_error(msg) {
            GenerationResult::RateLimited => GenerationResult::RateLimited,
            _ => GenerationResult::Failure(error.to_string()),
        },
        other => GenerationResult::Failure(other.to_string()),
    }
}

/// Classify an untyped provider error message.
pub fn classify_error(message: &str) -> GenerationResult {
    let lower = message.to_lowercase();
    if RE_STATUS_429.is_match(&lower) || RATE_LIMIT_PHRASES.iter().any(|m| lower.contains(m)) {
        GenerationResult::RateLimited
    } else {
        GenerationResult::Failure(message.to_string())
    }
}

// ── edgequake-llm implementation ─────────────────────────────────────────

enum ProviderSource {
    /// One provider serves every model id.
    Fixed(Arc<dyn LLMProvider>),
    /// Providers are created per model id through [`ProviderFactory`].
    Named(String),
}

/// [`GenerationClient`] over an edgequake-llm [`LLMProvider`].
///
/// With a named provider, one `LLMProvider` is created lazily per model id
/// and cached, so a request's `model` picks the backend model. A fixed
/// provider is used as-is whatever the request's model.
pub struct LlmGenerationClient {
    source: ProviderSource,
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmGenerationClient {
    /// Wrap a pre-built provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, max_tokens: usize, timeout: Duration) -> Self {
        Self {
            source: ProviderSource::Fixed(provider),
            providers: Mutex::new(HashMap::new()),
            max_tokens,
            timeout,
        }
    }

    /// Create providers named `provider_name` on demand.
    ///
    /// Fails early if the provider cannot be built for `model`, typically
    /// because its API key is missing.
    pub fn named(
        provider_name: impl Into<String>,
        model: &str,
        max_tokens: usize,
        timeout: Duration,
    ) -> Result<Self, DigestError> {
        let client = Self {
            source: ProviderSource::Named(provider_name.into()),
            providers: Mutex::new(HashMap::new()),
            max_tokens,
            timeout,
        };
        client
            .provider_for(model)
            .map_err(|hint| DigestError::ProviderNotConfigured {
                provider: client.provider_label().to_string(),
                hint,
            })?;
        Ok(client)
    }

    fn provider_label(&self) -> &str {
        match &self.source {
            ProviderSource::Fixed(_) => "custom",
            ProviderSource::Named(name) => name,
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, String> {
        let name = match &self.source {
            ProviderSource::Fixed(p) => return Ok(Arc::clone(p)),
            ProviderSource::Named(name) => name,
        };

        let mut cache = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = cache.get(model) {
            return Ok(Arc::clone(p));
        }
        let provider = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| format!("cannot create provider '{name}' for model '{model}': {e}"))?;
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

#[async_trait]
impl GenerationClient for LlmGenerationClient {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult {
        let provider = match self.provider_for(request.model) {
            Ok(p) => p,
            Err(msg) => return GenerationResult::Failure(msg),
        };

        let prompt = compose_prompt(request.instructions, request.source_text);
        let messages = vec![ChatMessage::user(prompt)];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&options))).await {
            Err(_) => {
                warn!(
                    "Generation call to '{}' timed out after {}s",
                    request.model,
                    self.timeout.as_secs()
                );
                GenerationResult::Failure(format!(
                    "generation call timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
            Ok(Err(e)) => {
                let result = classify_llm_error(&e);
                warn!("Generation call to '{}' failed: {}", request.model, e);
                result
            }
            Ok(Ok(response)) => {
                debug!(
                    "Model {}: {} input tokens, {} output tokens, {:?}",
                    request.model,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                if response.content.trim().is_empty() {
                    GenerationResult::Failure("backend returned an empty response".to_string())
                } else {
                    GenerationResult::Success(response.content)
                }
            }
        }
    }
}
