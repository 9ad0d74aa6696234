//! Batch runner: ask the question set, one batch per generation call.
//!
//! Batches are sent strictly one after another. The backend quota is shared
//! by every call of a run, so sending batches concurrently would only make
//! a rate-limit hit more likely; sequential sends also let the run stop at
//! the first bad answer without having spent quota on later batches.

use crate::config::DigestConfig;
use crate::error::{DigestError, Stage};
use crate::pipeline::llm::{GenerationClient, GenerationRequest, GenerationResult};
use crate::prompts::{build_batch_instructions, ProposedQuestions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Terminal status of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    AbortedOnRateLimit,
    AbortedOnError,
}

/// What a batch run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Successful batch answers, in batch order.
    pub answers: Vec<String>,
    pub status: RunStatus,
    /// Number of batches the strategy produced.
    pub total_batches: usize,
    /// Number of generation calls actually made.
    pub calls: usize,
    /// 1-indexed batch that aborted the run.
    pub aborted_at: Option<usize>,
    /// Backend message for `AbortedOnError`.
    pub failure: Option<String>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// All answers joined with a blank line, in batch order.
    pub fn joined(&self) -> String {
        self.answers.join("\n\n")
    }

    /// The joined answers of a completed run, or the abort as an error.
    pub fn into_result(self) -> Result<String, DigestError> {
        let stage = Stage::Batch {
            index: self.aborted_at.unwrap_or(self.calls),
            total: self.total_batches,
        };
        match self.status {
            RunStatus::Completed => Ok(self.joined()),
            RunStatus::AbortedOnRateLimit => Err(DigestError::RateLimited { stage }),
            RunStatus::AbortedOnError => Err(DigestError::GenerationFailed {
                stage,
                message: self.failure.unwrap_or_default(),
            }),
        }
    }
}

/// Run every batch of `config.questions` against `source_text`.
///
/// Batches come from `config.strategy`. Each batch is one call at
/// `config.temperature`; the first `RateLimited` or `Failure` stops the
/// run and discards nothing already collected (the caller decides what to
/// do with a non-completed outcome).
pub async fn run_batches(
    client: &dyn GenerationClient,
    source_text: &str,
    config: &DigestConfig,
) -> RunOutcome {
    let batches = config.strategy.partition(&config.questions);
    let total = batches.len();
    let model = config.model_id();
    let progress = config.progress_callback.as_deref();

    info!(
        "Asking {} questions in {} batch(es) ({}) with {}",
        config.questions.len(),
        total,
        config.strategy,
        model
    );
    if let Some(cb) = progress {
        cb.on_run_start(total);
    }

    let mut outcome = RunOutcome {
        answers: Vec::with_capacity(total),
        status: RunStatus::Completed,
        total_batches: total,
        calls: 0,
        aborted_at: None,
        failure: None,
    };

    for (i, batch) in batches.iter().enumerate() {
        let index = i + 1;
        let proposed = (index == total && config.generated_questions > 0).then(|| {
            ProposedQuestions {
                first_ordinal: config.questions.max_ordinal() + 1,
                count: config.generated_questions,
            }
        });
        let instructions = build_batch_instructions(batch, &config.prompt_template, proposed);
        debug!(
            "Batch {}/{}: questions {:?}, {} chars of instructions",
            index,
            total,
            batch.ordinals(),
            instructions.len()
        );

        if let Some(cb) = progress {
            cb.on_batch_start(index, total);
        }
        let request = GenerationRequest::new(source_text, &instructions, model, config.temperature);
        outcome.calls += 1;

        match client.generate(&request).await {
            GenerationResult::Success(text) => {
                if let Some(cb) = progress {
                    cb.on_batch_complete(index, total, text.len());
                }
                outcome.answers.push(text);
            }
            GenerationResult::RateLimited => {
                warn!("Batch {}/{} rate limited; aborting run", index, total);
                if let Some(cb) = progress {
                    cb.on_batch_error(index, total, "rate limited");
                }
                outcome.status = RunStatus::AbortedOnRateLimit;
                outcome.aborted_at = Some(index);
                return outcome;
            }
            GenerationResult::Failure(message) => {
                warn!("Batch {}/{} failed: {}", index, total, message);
                if let Some(cb) = progress {
                    cb.on_batch_error(index, total, &message);
                }
                outcome.status = RunStatus::AbortedOnError;
                outcome.aborted_at = Some(index);
                outcome.failure = Some(message);
                return outcome;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchStrategy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies from a script, one entry per call; records every request.
    struct Scripted {
        replies: Mutex<Vec<GenerationResult>>,
        seen: Mutex<Vec<(String, f32)>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<GenerationResult>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationClient for Scripted {
        async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult {
            self.seen
                .lock()
                .unwrap()
                .push((request.instructions.to_string(), request.temperature));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| GenerationResult::Failure("script exhausted".into()))
        }
    }

    fn ok(s: &str) -> GenerationResult {
        GenerationResult::Success(s.to_string())
    }

    fn config(strategy: BatchStrategy) -> DigestConfig {
        DigestConfig::builder().strategy(strategy).build().unwrap()
    }

    #[tokio::test]
    async fn completes_and_keeps_batch_order() {
        let client = Scripted::new(vec![ok("A"), ok("B"), ok("C")]);
        let outcome = run_batches(&client, "doc", &config(BatchStrategy::FixedSize(4))).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.answers, vec!["A", "B", "C"]);
        assert_eq!(outcome.calls, 3);
        assert_eq!(outcome.joined(), "A\n\nB\n\nC");
        assert_eq!(outcome.into_result().unwrap(), "A\n\nB\n\nC");
    }

    #[tokio::test]
    async fn rate_limit_on_second_of_three_stops_after_two_calls() {
        let client = Scripted::new(vec![ok("A"), GenerationResult::RateLimited, ok("C")]);
        let outcome = run_batches(&client, "doc", &config(BatchStrategy::FixedCount(3))).await;

        assert_eq!(client.calls(), 2);
        assert_eq!(outcome.status, RunStatus::AbortedOnRateLimit);
        assert_eq!(outcome.aborted_at, Some(2));
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(
            err,
            DigestError::RateLimited {
                stage: Stage::Batch { index: 2, total: 3 }
            }
        ));
    }

    #[tokio::test]
    async fn failure_stops_immediately_and_keeps_message() {
        let client = Scripted::new(vec![GenerationResult::Failure("bad key".into()), ok("B")]);
        let outcome = run_batches(&client, "doc", &config(BatchStrategy::FixedSize(5))).await;

        assert_eq!(client.calls(), 1);
        assert_eq!(outcome.status, RunStatus::AbortedOnError);
        assert_eq!(outcome.failure.as_deref(), Some("bad key"));
        assert!(outcome.answers.is_empty());
    }

    #[tokio::test]
    async fn uses_configured_temperature_and_lists_each_ordinal_once() {
        let client = Scripted::new(vec![ok("A"), ok("B")]);
        let config = DigestConfig::builder()
            .strategy(BatchStrategy::FixedCount(2))
            .temperature(0.4)
            .build()
            .unwrap();
        run_batches(&client, "doc", &config).await;

        let seen = client.seen.lock().unwrap();
        assert!(seen.iter().all(|(_, t)| (*t - 0.4).abs() < f32::EPSILON));
        for n in 1..=10 {
            let needle = format!("\n{n}. **");
            let hits: usize = seen.iter().map(|(i, _)| i.matches(&needle).count()).sum();
            assert_eq!(hits, 1, "ordinal {n}");
        }
    }

    #[tokio::test]
    async fn proposed_questions_only_in_last_batch() {
        let client = Scripted::new(vec![ok("A"), ok("B")]);
        let config = DigestConfig::builder()
            .strategy(BatchStrategy::FixedSize(5))
            .generated_questions(2)
            .build()
            .unwrap();
        run_batches(&client, "doc", &config).await;

        let seen = client.seen.lock().unwrap();
        assert!(!seen[0].0.contains("propose"));
        assert!(seen[1].0.contains("11–12"));
    }
}
