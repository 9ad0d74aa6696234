//! Summary pass: condense the normalized Q&A into a titled abstract.
//!
//! The abstract's first line is a `## ` title that later names the artifact
//! file (see [`crate::naming`]). The prompt asks for it, nothing enforces
//! it; a missing title only costs the file a descriptive name.

use crate::pipeline::llm::{GenerationClient, GenerationRequest, GenerationResult};
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::summary_instructions;
use tracing::info;

/// Summarize normalized Q&A text into an abstract of under `word_limit` words.
///
/// A `RateLimited` or `Failure` result is returned untouched.
pub async fn summarize(
    client: &dyn GenerationClient,
    normalized: &str,
    model: &str,
    temperature: f32,
    word_limit: usize,
) -> GenerationResult {
    info!("Summarizing {} chars of normalized answers", normalized.len());
    let instructions = summary_instructions(word_limit);
    let request = GenerationRequest::new(normalized, &instructions, model, temperature);
    match client.generate(&request).await {
        GenerationResult::Success(text) => GenerationResult::Success(clean_markdown(&text)),
        other => other,
    }
}
