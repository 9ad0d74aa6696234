//! Prompts for the three generation passes.
//!
//! Every piece of prompt text lives here so the passes themselves only deal
//! with sequencing and failure handling:
//!
//! 1. **Batch prompts**: built per [`QuestionBatch`] by
//!    [`build_batch_instructions`] from a [`PromptTemplate`].
//! 2. **Normalization**: [`NORMALIZE_INSTRUCTIONS`], fixed.
//! 3. **Summary**: [`summary_instructions`], parameterised by word limit.
//!
//! Batch prompts and the normalization prompt share one output schema
//! (question marker line, answer marker line, optional block-quoted
//! excerpt), rendered by [`schema_entry`].

use crate::questions::QuestionBatch;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Marker opening every answer in the canonical schema.
pub const ANSWER_MARKER: &str = "**🤖 回答：**";

/// Prefix of the optional supporting excerpt line.
pub const QUOTE_PREFIX: &str = "> [原文出處]";

/// Marker line opening question `ordinal` in the canonical schema.
pub fn question_marker(ordinal: u32) -> String {
    format!("**❓ 問題 {ordinal}：**")
}

/// One entry of the canonical schema with placeholder answer and quote.
pub fn schema_entry(ordinal: u32, text: &str) -> String {
    format!(
        "{} {}\n{}\n[Detailed Answer]\n{} [Quote from the article]\n",
        question_marker(ordinal),
        text,
        ANSWER_MARKER,
        QUOTE_PREFIX
    )
}

/// Fixed directives wrapped around every batch of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Task, language and register directive.
    pub preamble: String,
    /// Rules for quoting the source.
    pub quoting: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            preamble: "Analyze the following article and answer the questions in fluent and \
natural-sounding Traditional Chinese that reflects common language use in Taiwan."
                .to_string(),
            quoting: "Directly quote relevant parts of the article to support each answer. \
Do not translate or paraphrase the quotes."
                .to_string(),
        }
    }
}

/// Questions the model should invent and answer on top of the configured set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedQuestions {
    /// Ordinal of the first proposed question.
    pub first_ordinal: u32,
    pub count: u32,
}

/// Build the instructions for one batch.
///
/// Lists every question of the batch as `ordinal. **text**` in batch order,
/// then a literal output example in the canonical schema built from the
/// batch's first two questions. Never looks at the source text.
pub fn build_batch_instructions(
    batch: &QuestionBatch<'_>,
    template: &PromptTemplate,
    proposed: Option<ProposedQuestions>,
) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(template.preamble.trim());
    out.push(' ');
    out.push_str(template.quoting.trim());
    out.push_str("\n\n**Questions:**\n\n");

    for q in batch.questions() {
        let _ = writeln!(out, "{}. **{}**", q.ordinal, q.text.trim());
    }

    if let Some(p) = proposed.filter(|p| p.count > 0) {
        let last = p.first_ordinal + p.count - 1;
        let _ = write!(
            out,
            "\nAfter answering the questions above, propose {} further question(s) a careful \
reader of this article would ask, number them {}–{}, and answer them in the same format.\n",
            p.count, p.first_ordinal, last
        );
    }

    out.push_str("\n**Output Format Example:**\n\n");
    for q in batch.questions().iter().take(2) {
        out.push_str(&schema_entry(q.ordinal, q.text.trim()));
        out.push('\n');
    }
    out.push_str("Answer every question above, in order, using exactly this format.\n");
    out
}

/// Instructions for the normalization pass.
pub const NORMALIZE_INSTRUCTIONS: &str = r#"Please ensure the following text follows a consistent Markdown format.

**Format Requirements:**
1. Each question starts on its own line with "**❓ 問題 [Number]：**" followed by the question text.
2. Each answer starts on the next line with "**🤖 回答：**" followed by the answer.
3. After the answer, optionally add one supporting quote from the article on its own line, starting with "> [原文出處]" (a single Markdown blockquote).

**Example Format:**

**❓ 問題 1：** What problem does this paper aim to explore?
**🤖 回答：**
[Detailed Answer]
> [原文出處] [Quote from the article]

**❓ 問題 2：** Why is this problem worth investigating?
**🤖 回答：**
[Detailed Answer]
> [原文出處] [Quote from the article]

**Notes:**
- Keep every question, in its original order and numbering. Do not drop, merge or add questions.
- Do not change the content of answers or quotes; only fix the formatting.
- Output only the reformatted text.

Please reformat the text for consistency:"#;

/// Instructions for the summary pass.
pub fn summary_instructions(word_limit: usize) -> String {
    format!(
        r###"Please condense the following content, which is a Q&A format summary of a research article, into a concise abstract in fluent and natural-sounding Traditional Chinese, reflecting common language use in Taiwan. Begin the abstract title with a relevant emoji.

**Output Format:**

## [Emoji] [Title]

[Summary]

**Constraints:**

* The first line must be the title line, starting with "## ".
* Only use information provided in the Q&A summary. Do not introduce any external information or knowledge.
* The abstract must be less than {word_limit} words.
* Use Markdown format."###
    )
}

/// Join instructions and source text into the single prompt sent to the backend.
pub fn compose_prompt(instructions: &str, source_text: &str) -> String {
    format!("{instructions}\n\nArticle content:\n\n{source_text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchStrategy;
    use crate::questions::QuestionSet;

    #[test]
    fn batch_instructions_list_questions_in_order() {
        let set = QuestionSet::research_default();
        let batches = BatchStrategy::FixedSize(5).partition(&set);
        let text = build_batch_instructions(&batches[1], &PromptTemplate::default(), None);

        let positions: Vec<usize> = (6..=10)
            .map(|n| text.find(&format!("{n}. **")).expect("question listed"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!text.contains("1. **What problem"));
        assert!(text.contains("Traditional Chinese"));
        assert!(text.contains(&question_marker(6)));
        assert!(text.contains(ANSWER_MARKER));
    }

    #[test]
    fn batch_instructions_are_deterministic() {
        let set = QuestionSet::research_default();
        let batches = BatchStrategy::Single.partition(&set);
        let t = PromptTemplate::default();
        assert_eq!(
            build_batch_instructions(&batches[0], &t, None),
            build_batch_instructions(&batches[0], &t, None)
        );
    }

    #[test]
    fn proposed_questions_are_numbered_after_the_set() {
        let set = QuestionSet::research_default();
        let batches = BatchStrategy::Single.partition(&set);
        let proposed = ProposedQuestions {
            first_ordinal: 11,
            count: 2,
        };
        let text =
            build_batch_instructions(&batches[0], &PromptTemplate::default(), Some(proposed));
        assert!(text.contains("propose 2 further question(s)"));
        assert!(text.contains("11–12"));

        let zero = ProposedQuestions {
            first_ordinal: 11,
            count: 0,
        };
        let text = build_batch_instructions(&batches[0], &PromptTemplate::default(), Some(zero));
        assert!(!text.contains("propose"));
    }

    #[test]
    fn summary_instructions_carry_word_limit() {
        let text = summary_instructions(300);
        assert!(text.contains("less than 300 words"));
        assert!(text.contains("## "));
    }

    #[test]
    fn normalize_instructions_match_schema_markers() {
        assert!(NORMALIZE_INSTRUCTIONS.contains(&question_marker(1)));
        assert!(NORMALIZE_INSTRUCTIONS.contains(ANSWER_MARKER));
        assert!(NORMALIZE_INSTRUCTIONS.contains(QUOTE_PREFIX));
    }

    #[test]
    fn compose_prompt_puts_source_last() {
        let p = compose_prompt("Do X.", "BODY");
        assert!(p.starts_with("Do X."));
        assert!(p.ends_with("BODY"));
    }
}
