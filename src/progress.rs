//! Progress-callback trait for digest runs.
//!
//! Inject an [`Arc<dyn DigestProgressCallback>`] via
//! [`crate::config::DigestConfigBuilder::progress_callback`] to receive
//! events as the run moves through its batches and the two later passes.
//!
//! # Example
//!
//! ```rust
//! use edgequake_digest::{DigestConfig, DigestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl DigestProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, index: usize, total: usize, _len: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("batch {index}/{total} answered");
//!     }
//! }
//!
//! let config = DigestConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the pipeline as a run progresses.
///
/// All methods default to no-ops so implementors only override what they
/// need. Calls arrive in order from a single task; `Send + Sync` is
/// required because the callback is shared through the config.
pub trait DigestProgressCallback: Send + Sync {
    /// Called once after extraction, before the first batch.
    fn on_run_start(&self, total_batches: usize) {
        let _ = total_batches;
    }

    /// Called just before batch `index` (1-indexed) is sent.
    fn on_batch_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when batch `index` returned text of `answer_len` bytes.
    fn on_batch_complete(&self, index: usize, total: usize, answer_len: usize) {
        let _ = (index, total, answer_len);
    }

    /// Called when batch `index` was rate limited or failed. No further
    /// batches follow.
    fn on_batch_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called before the normalization and summary passes.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once when the run ends, successfully or not.
    fn on_run_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DigestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DigestConfig`].
pub type ProgressCallback = Arc<dyn DigestProgressCallback>;
