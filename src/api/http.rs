//! `reqwest`-backed [`ParseApi`] implementation.

use super::wire::{
    decode_envelope, BatchStatus, CreateTaskRequest, TaskCreated, TaskStatus, UploadSlotRequest,
    UploadSlots,
};
use super::{ParseApi, UploadSlot};
use crate::config::{ClientConfig, ParseOptions};
use crate::error::ParseError;
use crate::task::ParseTask;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP transport for the MinerU v4 API.
///
/// Cheap to clone; the inner `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Result<Self, ParseError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mineru-parse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParseError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Use a caller-supplied `reqwest::Client` (proxies, custom TLS roots).
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self { http, config }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.config.token)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
    }

    /// Send a request and return status plus body, or a transport-level reason.
    async fn send(
        &self,
        builder: RequestBuilder,
        timeout_secs: u64,
    ) -> Result<(StatusCode, Bytes), String> {
        let response = builder
            .send()
            .await
            .map_err(|e| describe(e, timeout_secs))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| describe(e, timeout_secs))?;
        Ok((status, body))
    }
}

fn describe(e: reqwest::Error, timeout_secs: u64) -> String {
    if e.is_timeout() {
        format!("request timed out after {timeout_secs}s")
    } else {
        e.to_string()
    }
}

#[async_trait]
impl ParseApi for HttpApi {
    async fn create_task(
        &self,
        file_url: &str,
        options: &ParseOptions,
    ) -> Result<String, ParseError> {
        let url = self.config.endpoint("extract/task");
        debug!("POST {}", url);
        let request = self
            .authed(self.http.post(&url))
            .json(&CreateTaskRequest::new(file_url, options));

        let (status, body) = self
            .send(request, self.config.request_timeout_secs)
            .await
            .map_err(|reason| ParseError::Submission { reason })?;

        decode_envelope::<TaskCreated>(status, &body)
            .map(|created| created.task_id)
            .map_err(|reason| ParseError::Submission { reason })
    }

    async fn task_status(&self, task_id: &str) -> Result<ParseTask, ParseError> {
        let url = self.config.endpoint(&format!("extract/task/{task_id}"));
        let query_err = |reason| ParseError::Query {
            id: task_id.to_string(),
            reason,
        };

        let (status, body) = self
            .send(self.authed(self.http.get(&url)), self.config.request_timeout_secs)
            .await
            .map_err(query_err)?;

        decode_envelope::<TaskStatus>(status, &body)
            .map(|s| s.into_task(task_id))
            .map_err(query_err)
    }

    async fn request_upload_slot(
        &self,
        file_name: &str,
        options: &ParseOptions,
    ) -> Result<UploadSlot, ParseError> {
        let url = self.config.endpoint("file-urls/batch");
        debug!("POST {} for '{}'", url, file_name);
        let request = self
            .authed(self.http.post(&url))
            .json(&UploadSlotRequest::single(file_name, options));

        let (status, body) = self
            .send(request, self.config.request_timeout_secs)
            .await
            .map_err(|reason| ParseError::Submission { reason })?;

        let slots = decode_envelope::<UploadSlots>(status, &body)
            .map_err(|reason| ParseError::Submission { reason })?;

        let upload_url = slots.file_urls.into_iter().next().ok_or_else(|| {
            ParseError::Submission {
                reason: format!("batch {} came back without an upload URL", slots.batch_id),
            }
        })?;

        Ok(UploadSlot {
            batch_id: slots.batch_id,
            upload_url,
        })
    }

    async fn upload(
        &self,
        slot: &UploadSlot,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<(), ParseError> {
        let upload_err = |reason| ParseError::Upload {
            batch_id: slot.batch_id.clone(),
            file_name: file_name.to_string(),
            reason,
        };

        // Pre-signed: the signature lives in the URL, so no bearer token.
        let request = self
            .http
            .put(&slot.upload_url)
            .timeout(Duration::from_secs(self.config.upload_timeout_secs))
            .body(bytes);

        let (status, _) = self
            .send(request, self.config.upload_timeout_secs)
            .await
            .map_err(upload_err)?;

        if !status.is_success() {
            return Err(upload_err(format!("HTTP {status}")));
        }
        Ok(())
    }

    async fn batch_status(&self, batch_id: &str) -> Result<Vec<ParseTask>, ParseError> {
        let url = self
            .config
            .endpoint(&format!("extract-results/batch/{batch_id}"));
        let query_err = |reason| ParseError::Query {
            id: batch_id.to_string(),
            reason,
        };

        let (status, body) = self
            .send(self.authed(self.http.get(&url)), self.config.request_timeout_secs)
            .await
            .map_err(query_err)?;

        decode_envelope::<BatchStatus>(status, &body)
            .map(|s| s.into_tasks(batch_id))
            .map_err(query_err)
    }

    async fn download(&self, url: &str) -> Result<Bytes, ParseError> {
        let download_err = |reason| ParseError::Download {
            url: url.to_string(),
            reason,
        };
        let secs = self.config.download_timeout_secs;
        let request = self.http.get(url).timeout(Duration::from_secs(secs));

        let (status, body) = self.send(request, secs).await.map_err(download_err)?;
        if !status.is_success() {
            return Err(download_err(format!("HTTP {status}")));
        }
        Ok(body)
    }
}
