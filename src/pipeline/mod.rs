//! Pipeline stages for turning a PDF into a research digest.
//!
//! Each submodule implements exactly one step. Generation goes through the
//! [`llm::GenerationClient`] trait so every stage above it can be driven by
//! a scripted client in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ batch ──▶ normalize ──▶ summarize
//! (URL/path) (text)    (Q&A × n)  (temp 0.0)    (abstract)
//! ```
//!
//! 1. [`input`]: read a local file or download a URL; check `%PDF`
//! 2. [`extract`]: pull the text layer; runs in `spawn_blocking`
//! 3. [`batch`]: ask the question batches one call at a time, stopping
//!    at the first rate limit or failure
//! 4. [`normalize`]: one call that re-flows every answer into one schema
//! 5. [`summarize`]: one call that writes the titled abstract
//!
//! [`postprocess`] cleans the output of the last two stages; [`llm`] is the
//! only place backend error text is interpreted.

pub mod batch;
pub mod extract;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
pub mod summarize;
