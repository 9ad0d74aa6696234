//! Normalization pass: re-flow the batch answers into one Markdown schema.
//!
//! Each batch is answered by a separate call and the model drifts in how it
//! formats questions, answers and quotes. One extra call at temperature 0.0
//! rewrites the concatenated answers into the canonical schema from
//! [`crate::prompts::NORMALIZE_INSTRUCTIONS`].

use crate::pipeline::llm::{GenerationClient, GenerationRequest, GenerationResult};
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::NORMALIZE_INSTRUCTIONS;
use tracing::info;

/// The normalization pass always samples deterministically.
pub const NORMALIZE_TEMPERATURE: f32 = 0.0;

/// Normalize the joined answers of a completed batch run.
///
/// `answers` must already be joined in batch order with a blank line between
/// batches (see [`crate::pipeline::batch::RunOutcome::joined`]). A
/// `RateLimited` or `Failure` result is returned untouched.
pub async fn normalize(client: &dyn GenerationClient, answers: &str, model: &str) -> GenerationResult {
    info!("Normalizing {} chars of answers", answers.len());
    let request = GenerationRequest::new(answers, NORMALIZE_INSTRUCTIONS, model, NORMALIZE_TEMPERATURE);
    match client.generate(&request).await {
        GenerationResult::Success(text) => GenerationResult::Success(clean_markdown(&text)),
        other => other,
    }
}
