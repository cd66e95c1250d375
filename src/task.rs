//! Parse task data model.
//!
//! A [`ParseTask`] is the client-side view of one service job, rebuilt from
//! scratch on every status query. The client never stores tasks; it only
//! keeps the latest snapshot inside the polling loop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state reported by the service.
///
/// `Done` and `Failed` are terminal. Anything the service sends that is not
/// listed here becomes [`TaskState::Unknown`] and is treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    Pending,
    WaitingFile,
    Running,
    Converting,
    Done,
    Failed,
    Unknown(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TaskState::Unknown(_))
    }

    /// The wire spelling of this state.
    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Pending => "pending",
            TaskState::WaitingFile => "waiting-file",
            TaskState::Running => "running",
            TaskState::Converting => "converting",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
            TaskState::Unknown(s) => s,
        }
    }
}

impl From<&str> for TaskState {
    fn from(s: &str) -> Self {
        match s {
            "pending" => TaskState::Pending,
            "waiting-file" => TaskState::WaitingFile,
            "running" => TaskState::Running,
            "converting" => TaskState::Converting,
            "done" => TaskState::Done,
            "failed" => TaskState::Failed,
            other => TaskState::Unknown(other.to_string()),
        }
    }
}

impl From<String> for TaskState {
    fn from(s: String) -> Self {
        TaskState::from(s.as_str())
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page-level extraction progress of a running task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractProgress {
    pub extracted_pages: u32,
    pub total_pages: u32,
    /// Service-formatted start timestamp, passed through untouched.
    pub start_time: String,
}

impl ExtractProgress {
    /// Completion ratio in `0.0..=1.0`; `0.0` while the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            (self.extracted_pages as f64 / self.total_pages as f64).min(1.0)
        }
    }
}

/// Snapshot of one parse job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTask {
    /// `task_id` for URL submissions, `batch_id` for uploads.
    pub task_id: String,
    /// File name reported by batch queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub state: TaskState,
    /// Present only while `running` or `converting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ExtractProgress>,
    /// Result archive location; present only when `done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Service failure reason; present only when `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ParseTask {
    /// Assemble a snapshot, dropping fields that are meaningless for `state`.
    pub fn new(
        task_id: impl Into<String>,
        state: TaskState,
        progress: Option<ExtractProgress>,
        result_url: Option<String>,
        error_message: Option<String>,
    ) -> Self {
        let progress = match state {
            TaskState::Running | TaskState::Converting => progress,
            _ => None,
        };
        let result_url = result_url.filter(|_| state == TaskState::Done);
        let error_message = error_message.filter(|_| state == TaskState::Failed);
        Self {
            task_id: task_id.into(),
            file_name: None,
            state,
            progress,
            result_url: non_empty(result_url),
            error_message: non_empty(error_message),
        }
    }

    pub fn with_file_name(mut self, name: Option<String>) -> Self {
        self.file_name = non_empty(name);
        self
    }

    pub fn is_done(&self) -> bool {
        self.state == TaskState::Done
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}
