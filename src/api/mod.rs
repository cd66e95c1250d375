//! Service access layer.
//!
//! [`ParseApi`] has one method per HTTP call of the MinerU protocol and
//! nothing else: no polling, no retries. The polling state machine in
//! [`crate::poll`] and the facade in [`crate::client`] are written against
//! this trait, which keeps them independent of the transport.
//!
//! ```text
//! create_task ─────────────────────────────▶ task_status (polled)
//! request_upload_slot ──▶ upload ──────────▶ batch_status (polled)
//!                                            download (caller-driven)
//! ```
//!
//! [`HttpApi`] is the production implementation over `reqwest`. Each method
//! maps its own failures onto the matching [`ParseError`] variant, so the
//! layers above only propagate.

pub mod http;
pub mod wire;

use crate::config::ParseOptions;
use crate::error::ParseError;
use crate::task::ParseTask;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub use http::HttpApi;

/// A pre-signed upload target returned by the upload-slot request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    pub batch_id: String,
    pub upload_url: String,
}

/// One method per remote call of the parse service.
#[async_trait]
pub trait ParseApi: Send + Sync {
    /// `POST /extract/task`; returns the new `task_id`.
    ///
    /// Fails with [`ParseError::Submission`].
    async fn create_task(&self, file_url: &str, options: &ParseOptions)
        -> Result<String, ParseError>;

    /// `GET /extract/task/{task_id}`.
    ///
    /// Fails with [`ParseError::Query`].
    async fn task_status(&self, task_id: &str) -> Result<ParseTask, ParseError>;

    /// `POST /file-urls/batch` for a single file.
    ///
    /// Fails with [`ParseError::Submission`].
    async fn request_upload_slot(
        &self,
        file_name: &str,
        options: &ParseOptions,
    ) -> Result<UploadSlot, ParseError>;

    /// `PUT` of the raw bytes to the pre-signed URL, without credentials.
    ///
    /// Fails with [`ParseError::Upload`].
    async fn upload(&self, slot: &UploadSlot, file_name: &str, bytes: Bytes)
        -> Result<(), ParseError>;

    /// `GET /extract-results/batch/{batch_id}`.
    ///
    /// Fails with [`ParseError::Query`].
    async fn batch_status(&self, batch_id: &str) -> Result<Vec<ParseTask>, ParseError>;

    /// Plain `GET` of a result archive.
    ///
    /// Fails with [`ParseError::Download`].
    async fn download(&self, url: &str) -> Result<Bytes, ParseError>;
}

#[async_trait]
impl<T: ParseApi + ?Sized> ParseApi for Arc<T> {
    async fn create_task(
        &self,
        file_url: &str,
        options: &ParseOptions,
    ) -> Result<String, ParseError> {
        (**self).create_task(file_url, options).await
    }

    async fn task_status(&self, task_id: &str) -> Result<ParseTask, ParseError> {
        (**self).task_status(task_id).await
    }

    async fn request_upload_slot(
        &self,
        file_name: &str,
        options: &ParseOptions,
    ) -> Result<UploadSlot, ParseError> {
        (**self).request_upload_slot(file_name, options).await
    }

    async fn upload(
        &self,
        slot: &UploadSlot,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<(), ParseError> {
        (**self).upload(slot, file_name, bytes).await
    }

    async fn batch_status(&self, batch_id: &str) -> Result<Vec<ParseTask>, ParseError> {
        (**self).batch_status(batch_id).await
    }

    async fn download(&self, url: &str) -> Result<Bytes, ParseError> {
        (**self).download(url).await
    }
}
