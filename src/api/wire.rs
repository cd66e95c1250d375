//! Request and response schemas of the MinerU v4 HTTP API.
//!
//! Every JSON response is wrapped in the same envelope:
//!
//! ```text
//! { "code": 0, "msg": "ok", "data": { ... } }
//! ```
//!
//! `code == 0` means success. [`decode_envelope`] folds the HTTP status, the
//! envelope code and the payload into one `Result`, so callers never compare
//! codes or state strings themselves.

use crate::config::{ExtraFormat, ParseOptions};
use crate::task::{ExtractProgress, ParseTask, TaskState};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ── Envelope ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    msg: String,
    data: Option<T>,
}

/// Loose envelope used to salvage `msg` from an error response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode an API response body into its `data` payload.
///
/// Returns a human-readable reason on a non-2xx status, an undecodable body,
/// a non-zero `code`, or a missing `data` field.
pub fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, String> {
    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.msg.or(b.message))
            .filter(|m| !m.trim().is_empty());
        return Err(match detail {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        });
    }

    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| format!("unexpected response body: {e}"))?;

    if envelope.code != 0 {
        return Err(if envelope.msg.trim().is_empty() {
            format!("service returned code {}", envelope.code)
        } else {
            envelope.msg
        });
    }

    envelope
        .data
        .ok_or_else(|| "response envelope has no data".to_string())
}

// ── Requests ─────────────────────────────────────────────────────────────

fn no_formats(formats: &&[ExtraFormat]) -> bool {
    formats.is_empty()
}

/// Body of `POST /extract/task`.
#[derive(Debug, Serialize)]
pub struct CreateTaskRequest<'a> {
    pub url: &'a str,
    pub model_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ocr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_formula: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_table: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<&'a str>,
    #[serde(skip_serializing_if = "no_formats")]
    pub extra_formats: &'a [ExtraFormat],
}

impl<'a> CreateTaskRequest<'a> {
    pub fn new(url: &'a str, options: &'a ParseOptions) -> Self {
        Self {
            url,
            model_version: options.model_version.as_str(),
            is_ocr: options.is_ocr,
            enable_formula: options.enable_formula,
            enable_table: options.enable_table,
            language: options.language.as_deref(),
            page_ranges: options.page_ranges.as_deref(),
            extra_formats: &options.extra_formats,
        }
    }
}

/// One entry of `files[]` in an upload-slot request.
#[derive(Debug, Serialize)]
pub struct UploadFileEntry<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ocr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<&'a str>,
}

/// Body of `POST /file-urls/batch`.
#[derive(Debug, Serialize)]
pub struct UploadSlotRequest<'a> {
    pub files: Vec<UploadFileEntry<'a>>,
    pub model_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_formula: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_table: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'a str>,
    #[serde(skip_serializing_if = "no_formats")]
    pub extra_formats: &'a [ExtraFormat],
}

impl<'a> UploadSlotRequest<'a> {
    /// Single-file request; per-file options travel inside the file entry.
    pub fn single(file_name: &'a str, options: &'a ParseOptions) -> Self {
        Self {
            files: vec![UploadFileEntry {
                name: file_name,
                is_ocr: options.is_ocr,
                page_ranges: options.page_ranges.as_deref(),
            }],
            model_version: options.model_version.as_str(),
            enable_formula: options.enable_formula,
            enable_table: options.enable_table,
            language: options.language.as_deref(),
            extra_formats: &options.extra_formats,
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────

/// `data` of a successful task creation.
#[derive(Debug, Deserialize)]
pub struct TaskCreated {
    pub task_id: String,
}

/// `data` of a successful upload-slot request.
#[derive(Debug, Deserialize)]
pub struct UploadSlots {
    pub batch_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireProgress {
    #[serde(default, deserialize_with = "null_as_default")]
    pub extracted_pages: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_pages: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_time: String,
}

impl From<WireProgress> for ExtractProgress {
    fn from(p: WireProgress) -> Self {
        ExtractProgress {
            extracted_pages: p.extracted_pages,
            total_pages: p.total_pages,
            start_time: p.start_time,
        }
    }
}

/// `data` of `GET /extract/task/{id}`.
#[derive(Debug, Deserialize)]
pub struct TaskStatus {
    pub task_id: Option<String>,
    pub state: TaskState,
    pub full_zip_url: Option<String>,
    pub err_msg: Option<String>,
    pub extract_progress: Option<WireProgress>,
}

impl TaskStatus {
    /// Convert to a [`ParseTask`], falling back to `requested_id` when the
    /// service omits `task_id`.
    pub fn into_task(self, requested_id: &str) -> ParseTask {
        let id = self
            .task_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| requested_id.to_string());
        ParseTask::new(
            id,
            self.state,
            self.extract_progress.map(Into::into),
            self.full_zip_url,
            self.err_msg,
        )
    }
}

/// One per-file entry of a batch status.
#[derive(Debug, Deserialize)]
pub struct BatchItem {
    pub file_name: Option<String>,
    pub state: TaskState,
    pub full_zip_url: Option<String>,
    pub err_msg: Option<String>,
    pub extract_progress: Option<WireProgress>,
}

/// `data` of `GET /extract-results/batch/{id}`.
#[derive(Debug, Deserialize)]
pub struct BatchStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub extract_result: Vec<BatchItem>,
}

impl BatchStatus {
    /// One [`ParseTask`] per file, each identified by the batch id.
    pub fn into_tasks(self, batch_id: &str) -> Vec<ParseTask> {
        self.extract_result
            .into_iter()
            .map(|item| {
                ParseTask::new(
                    batch_id,
                    item.state,
                    item.extract_progress.map(Into::into),
                    item.full_zip_url,
                    item.err_msg,
                )
                .with_file_name(item.file_name)
            })
            .collect()
    }
}
