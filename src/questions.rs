//! The research question battery and its partitioning into batches.
//!
//! A [`QuestionSet`] is an ordered list of [`Question`]s with unique,
//! positive ordinals. The ordinal fixes both display order and the order in
//! which answers appear in prompts, so the set is always kept sorted.
//!
//! The set size is deliberately not fixed: the built-in battery has ten
//! questions, but any TOML file of the form
//!
//! ```toml
//! [[questions]]
//! ordinal = 1
//! text = "What problem does this paper aim to explore?"
//! ```
//!
//! can replace it.

use crate::error::DigestError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A single research question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based position of the question in the set.
    pub ordinal: u32,
    pub text: String,
}

impl Question {
    pub fn new(ordinal: u32, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }
}

/// An ordered, validated list of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

#[derive(Deserialize)]
struct QuestionFile {
    questions: Vec<Question>,
}

const DEFAULT_QUESTIONS: [&str; 10] = [
    "What problem does this paper aim to explore?",
    "Why is this problem worth investigating?",
    "What are the main findings and contributions of this research?",
    "What methods and techniques did the researchers use to conduct this study?",
    "What are the key theoretical foundations of this research?",
    "What data or samples were used in the study, and what are their characteristics?",
    "What is the reliability and statistical significance of the research findings?",
    "What challenges were encountered during the research process, and how were they overcome?",
    "How can the research findings be applied in practice or impact related fields?",
    "What are the limitations of the research, and what are the directions for future research?",
];

impl QuestionSet {
    /// Build a set from arbitrary questions.
    ///
    /// Questions are sorted by ordinal. Fails on an empty list, a zero
    /// ordinal, a duplicate ordinal, or blank question text.
    pub fn new(mut questions: Vec<Question>) -> Result<Self, DigestError> {
        if questions.is_empty() {
            return Err(DigestError::InvalidQuestionSet(
                "at least one question is required".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if q.ordinal == 0 {
                return Err(DigestError::InvalidQuestionSet(
                    "ordinals are 1-based, got 0".into(),
                ));
            }
            if !seen.insert(q.ordinal) {
                return Err(DigestError::InvalidQuestionSet(format!(
                    "duplicate ordinal {}",
                    q.ordinal
                )));
            }
            if q.text.trim().is_empty() {
                return Err(DigestError::InvalidQuestionSet(format!(
                    "question {} has no text",
                    q.ordinal
                )));
            }
        }

        questions.sort_by_key(|q| q.ordinal);
        Ok(Self { questions })
    }

    /// The ten built-in research-comprehension questions.
    pub fn research_default() -> Self {
        let questions = DEFAULT_QUESTIONS
            .iter()
            .zip(1u32..)
            .map(|(text, ordinal)| Question::new(ordinal, *text))
            .collect();
        Self { questions }
    }

    /// Parse a TOML question file.
    pub fn from_toml_str(src: &str) -> Result<Self, DigestError> {
        let file: QuestionFile = toml::from_str(src)
            .map_err(|e| DigestError::InvalidQuestionSet(format!("TOML parse error: {e}")))?;
        Self::new(file.questions)
    }

    /// Read and parse a TOML question file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DigestError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|e| {
            DigestError::InvalidQuestionSet(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&src)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Highest ordinal in the set; AI-proposed questions are numbered after it.
    pub fn max_ordinal(&self) -> u32 {
        self.questions.last().map(|q| q.ordinal).unwrap_or(0)
    }
}

impl Default for QuestionSet {
    fn default() -> Self {
        Self::research_default()
    }
}

/// A contiguous, non-empty slice of a [`QuestionSet`] sent in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBatch<'a> {
    questions: &'a [Question],
}

impl<'a> QuestionBatch<'a> {
    pub(crate) fn new(questions: &'a [Question]) -> Self {
        debug_assert!(!questions.is_empty());
        Self { questions }
    }

    pub fn questions(&self) -> &'a [Question] {
        self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn ordinals(&self) -> Vec<u32> {
        self.questions.iter().map(|q| q.ordinal).collect()
    }
}
