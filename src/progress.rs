//! Progress-callback trait for parse lifecycle events.
//!
//! Pass a `&dyn ParseProgressCallback` to [`crate::ParseClient::parse_by_url`]
//! or [`crate::ParseClient::parse_local_file`] to observe a job while the
//! client waits on it: submission, upload, every status poll, page-level
//! extraction progress, and the terminal snapshot.
//!
//! # Example
//!
//! ```rust
//! use mineru_parse::{ExtractProgress, ParseProgressCallback};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! struct PageCounter {
//!     last: AtomicU32,
//! }
//!
//! impl ParseProgressCallback for PageCounter {
//!     fn on_progress(&self, progress: &ExtractProgress) {
//!         self.last.store(progress.extracted_pages, Ordering::SeqCst);
//!         eprintln!("{}/{} pages", progress.extracted_pages, progress.total_pages);
//!     }
//! }
//!
//! let counter = PageCounter { last: AtomicU32::new(0) };
//! counter.on_progress(&ExtractProgress { extracted_pages: 4, total_pages: 9, ..Default::default() });
//! assert_eq!(counter.last.load(Ordering::SeqCst), 4);
//! ```

use crate::task::{ExtractProgress, ParseTask, TaskState};
use std::sync::Arc;

/// Called by the client as a parse job advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: one callback
/// may be shared by several concurrent parses.
pub trait ParseProgressCallback: Send + Sync {
    /// The service accepted the request.
    ///
    /// # Arguments
    /// * `id` — `task_id` for URL submissions, `batch_id` for uploads
    fn on_submitted(&self, id: &str) {
        let _ = id;
    }

    /// The file bytes reached the pre-signed URL.
    fn on_uploaded(&self, batch_id: &str, bytes: usize) {
        let _ = (batch_id, bytes);
    }

    /// A status query returned a non-terminal state.
    ///
    /// # Arguments
    /// * `attempt`      — 1-indexed query number
    /// * `max_attempts` — the attempt budget
    /// * `state`        — state reported by this query
    fn on_poll(&self, attempt: u32, max_attempts: u32, state: &TaskState) {
        let _ = (attempt, max_attempts, state);
    }

    /// Page-level progress while the task is `running`.
    ///
    /// Called at most once per poll, never for terminal states, and with
    /// non-decreasing `extracted_pages` over the life of one job.
    fn on_progress(&self, progress: &ExtractProgress) {
        let _ = progress;
    }

    /// The task reached `done`.
    fn on_finished(&self, task: &ParseTask) {
        let _ = task;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ParseProgressCallback for NoopProgressCallback {}

/// Convenience alias for sharing one callback across tasks.
pub type ProgressCallback = Arc<dyn ParseProgressCallback>;
