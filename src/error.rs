//! Error types for the mineru-parse library.
//!
//! Every failure is fatal to the operation that raised it and is surfaced to
//! the caller as one [`ParseError`] variant. Nothing here is retried by the
//! library; the only loop is the status poll itself.
//!
//! The variants are grouped by the protocol step that produced them so a
//! caller can tell *where* the flow broke:
//!
//! * submission (`Submission`) — creating a task or requesting an upload slot
//! * upload (`Upload`) — the PUT to the pre-signed URL
//! * polling (`Query`, `TaskFailed`, `Timeout`, `UnrecognizedState`,
//!   `Cancelled`)
//! * result retrieval (`Download`, `OutputWriteFailed`)
//! * local input and configuration
//!
//! [`ParseError::is_retryable`] separates transient outcomes (a timeout, a
//! flaky status query) from explicit service verdicts (a task the service
//! marked as `failed`).

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the mineru-parse library.
#[derive(Debug, Error)]
pub enum ParseError {
    // ── Submission ────────────────────────────────────────────────────────
    /// Task creation or upload-slot request was rejected.
    #[error("Failed to submit parse request: {reason}")]
    Submission { reason: String },

    // ── Upload ────────────────────────────────────────────────────────────
    /// The PUT of the file bytes to the pre-signed URL failed.
    #[error("Failed to upload '{file_name}' (batch {batch_id}): {reason}")]
    Upload {
        batch_id: String,
        file_name: String,
        reason: String,
    },

    // ── Polling ───────────────────────────────────────────────────────────
    /// A status query failed (non-2xx or non-zero service code).
    #[error("Status query for '{id}' failed: {reason}")]
    Query { id: String, reason: String },

    /// The service reported the task as `failed`.
    #[error("Parse task '{id}' failed: {message}")]
    TaskFailed { id: String, message: String },

    /// The attempt budget ran out before the task reached a terminal state.
    #[error("Parse task '{id}' did not finish after {attempts} status checks\nTry again later or raise --max-attempts.")]
    Timeout { id: String, attempts: u32 },

    /// Too many consecutive status reports carried a state this client does
    /// not recognise.
    #[error("Parse task '{id}' reported unrecognised state '{state}' {consecutive} times in a row")]
    UnrecognizedState {
        id: String,
        state: String,
        consecutive: u32,
    },

    /// The caller cancelled the operation.
    #[error("Parse of '{id}' was cancelled")]
    Cancelled { id: String },

    // ── Results ───────────────────────────────────────────────────────────
    /// Fetching the result archive failed.
    #[error("Failed to download '{url}': {reason}")]
    Download { url: String, reason: String },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Local input ───────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure reading a local input.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParseError {
    /// Whether re-running the whole operation might succeed.
    ///
    /// Timeouts, failed status queries, uploads and downloads are usually
    /// transient. A task the service explicitly marked `failed`, a rejected
    /// submission, or a local input problem will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ParseError::Timeout { .. }
                | ParseError::Query { .. }
                | ParseError::Upload { .. }
                | ParseError::Download { .. }
        )
    }

    /// The task or batch identifier this error refers to, when there is one.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ParseError::Query { id, .. }
            | ParseError::TaskFailed { id, .. }
            | ParseError::Timeout { id, .. }
            | ParseError::UnrecognizedState { id, .. }
            | ParseError::Cancelled { id } => Some(id),
            ParseError::Upload { batch_id, .. } => Some(batch_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failed_display_carries_message() {
        let e = ParseError::TaskFailed {
            id: "t-1".into(),
            message: "file is encrypted".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("t-1"), "got: {msg}");
        assert!(msg.contains("file is encrypted"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = ParseError::Timeout {
            id: "b-9".into(),
            attempts: 300,
        };
        assert!(e.to_string().contains("300 status checks"));
    }

    #[test]
    fn timeout_is_retryable_task_failed_is_not() {
        let timeout = ParseError::Timeout {
            id: "x".into(),
            attempts: 1,
        };
        let failed = ParseError::TaskFailed {
            id: "x".into(),
            message: "bad".into(),
        };
        assert!(timeout.is_retryable());
        assert!(!failed.is_retryable());
    }

    #[test]
    fn submission_is_not_retryable() {
        let e = ParseError::Submission {
            reason: "invalid token".into(),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.task_id(), None);
    }

    #[test]
    fn upload_reports_batch_id() {
        let e = ParseError::Upload {
            batch_id: "B1".into(),
            file_name: "deck.pdf".into(),
            reason: "HTTP 403 Forbidden".into(),
        };
        assert_eq!(e.task_id(), Some("B1"));
        assert!(e.to_string().contains("deck.pdf"));
    }
}
