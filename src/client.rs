//! The parse client: submission, upload, polling and result retrieval.
//!
//! [`ParseClient`] hides the service's multi-step asynchronous protocol
//! behind a handful of `async fn`s that resolve only once a job is terminal.
//! It holds no per-job state; every identifier is passed explicitly, so one
//! client can be shared (`Arc`) across any number of concurrent parses.

use crate::api::{HttpApi, ParseApi};
use crate::config::{ClientConfig, ParseOptions};
use crate::error::ParseError;
use crate::input::{self, LocalFile};
use crate::poll::{self, PollSettings};
use crate::progress::ParseProgressCallback;
use crate::task::ParseTask;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Async client for the document-parsing service.
///
/// # Example
/// ```rust,no_run
/// use mineru_parse::{ClientConfig, ParseClient, ParseOptions};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ParseClient::new(ClientConfig::from_env()?)?;
/// let task = client
///     .parse_local_file("slides.pdf", &ParseOptions::default(), None, &CancellationToken::new())
///     .await?;
/// if let Some(url) = task.result_url.as_deref() {
///     client.download_result_to_file(url, "slides.zip").await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct ParseClient<A = HttpApi> {
    api: A,
    config: ClientConfig,
}

impl ParseClient<HttpApi> {
    /// Create a client talking HTTP to `config.api_base`.
    pub fn new(config: ClientConfig) -> Result<Self, ParseError> {
        let api = HttpApi::new(config.clone())?;
        Ok(Self { api, config })
    }

    /// Shorthand for `ParseClient::new(ClientConfig::from_env()?)`.
    pub fn from_env() -> Result<Self, ParseError> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<A: ParseApi> ParseClient<A> {
    /// Create a client over any [`ParseApi`] implementation.
    pub fn with_api(config: ClientConfig, api: A) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submit a fetchable URL and wait for the task to finish.
    ///
    /// # Errors
    /// * [`ParseError::Submission`] — the task could not be created
    /// * [`ParseError::TaskFailed`] — the service reported `failed`
    /// * [`ParseError::Timeout`] — no terminal state within the attempt budget
    /// * [`ParseError::Query`] — a status query failed
    /// * [`ParseError::Cancelled`] — `cancel` fired
    pub async fn parse_by_url(
        &self,
        file_url: &str,
        options: &ParseOptions,
        progress: Option<&dyn ParseProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ParseTask, ParseError> {
        info!("Submitting {} for parsing", file_url);
        let task_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ParseError::Cancelled { id: file_url.to_string() });
            }
            created = self.api.create_task(file_url, options) => created?,
        };
        info!("Created task {}", task_id);
        if let Some(cb) = progress {
            cb.on_submitted(&task_id);
        }

        poll::poll_until_terminal(&task_id, self.poll_settings(), progress, cancel, || async {
            self.api.task_status(&task_id).await.map(Some)
        })
        .await
    }

    /// Upload a local file and wait for it to be parsed.
    ///
    /// Runs the three-step upload protocol: request an upload slot, PUT the
    /// bytes to the pre-signed URL, then poll the batch. An upload failure is
    /// fatal and no status query is issued.
    ///
    /// # Errors
    /// As [`ParseClient::parse_by_url`], plus [`ParseError::Upload`] and the
    /// local input errors ([`ParseError::FileNotFound`],
    /// [`ParseError::PermissionDenied`], [`ParseError::Io`]).
    pub async fn parse_local_file(
        &self,
        path: impl AsRef<Path>,
        options: &ParseOptions,
        progress: Option<&dyn ParseProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ParseTask, ParseError> {
        let file = input::read_local_file(path).await?;
        self.parse_file(file, options, progress, cancel).await
    }

    /// Upload an in-memory document and wait for it to be parsed.
    pub async fn parse_bytes(
        &self,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
        options: &ParseOptions,
        progress: Option<&dyn ParseProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ParseTask, ParseError> {
        let file = LocalFile::new(file_name, bytes);
        self.parse_file(file, options, progress, cancel).await
    }

    async fn parse_file(
        &self,
        file: LocalFile,
        options: &ParseOptions,
        progress: Option<&dyn ParseProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ParseTask, ParseError> {
        let size = file.len();
        info!(
            "Parsing {} ({:.2} MB)",
            file.name,
            size as f64 / 1024.0 / 1024.0
        );
        let cancelled = || ParseError::Cancelled {
            id: file.name.clone(),
        };

        // ── Step 1: Request upload slot ──────────────────────────────────
        debug!("Step 1/3: requesting upload slot");
        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            slot = self.api.request_upload_slot(&file.name, options) => slot?,
        };
        info!("Got upload slot, batch_id {}", slot.batch_id);
        if let Some(cb) = progress {
            cb.on_submitted(&slot.batch_id);
        }

        // ── Step 2: Upload bytes ─────────────────────────────────────────
        debug!("Step 2/3: uploading {} bytes", size);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            uploaded = self.api.upload(&slot, &file.name, file.bytes.clone()) => uploaded?,
        };
        info!("Uploaded {}", file.name);
        if let Some(cb) = progress {
            cb.on_uploaded(&slot.batch_id, size);
        }

        // ── Step 3: Poll the batch ───────────────────────────────────────
        debug!("Step 3/3: waiting for batch {}", slot.batch_id);
        let batch_id = slot.batch_id.as_str();
        poll::poll_until_terminal(batch_id, self.poll_settings(), progress, cancel, || async {
            // Single-file batches: the first entry is ours.
            let statuses = self.api.batch_status(batch_id).await?;
            Ok(statuses.into_iter().next())
        })
        .await
    }

    /// Query a single task once.
    pub async fn get_task_status(&self, task_id: &str) -> Result<ParseTask, ParseError> {
        self.api.task_status(task_id).await
    }

    /// Query every per-file status of a batch once.
    pub async fn get_batch_status(&self, batch_id: &str) -> Result<Vec<ParseTask>, ParseError> {
        self.api.batch_status(batch_id).await
    }

    /// Fetch a result archive into memory.
    pub async fn download_result(&self, result_url: &str) -> Result<Bytes, ParseError> {
        info!("Downloading result {}", result_url);
        let bytes = self.api.download(result_url).await?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Fetch a result archive and write it to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files. Each
    /// call writes its own temp file, so concurrent downloads never share one.
    /// Returns the number of bytes written.
    pub async fn download_result_to_file(
        &self,
        result_url: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<u64, ParseError> {
        let bytes = self.download_result(result_url).await?;
        let path = output_path.as_ref();
        let write_err = |source| ParseError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = temp_path_for(path);
        if let Err(e) = tokio::fs::write(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes.len() as u64)
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings::from(&self.config)
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path, unique per process and call: `dir/.name.<pid>-<n>.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result.zip".to_string());
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}-{seq}.tmp", std::process::id()))
}
