//! Configuration types for the parse client.
//!
//! Two structs cover everything a caller can tune:
//!
//! * [`ClientConfig`] — where the service lives, how to authenticate, and how
//!   patiently to poll. Built via [`ClientConfigBuilder`] or
//!   [`ClientConfig::from_env`].
//! * [`ParseOptions`] — per-request knobs forwarded to the service verbatim
//!   (model, OCR, formula/table extraction, language, page ranges, extra
//!   output formats). Unset fields are omitted so the service applies its own
//!   defaults.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Public service root used when no `api_base` is configured.
pub const DEFAULT_API_BASE: &str = "https://mineru.net/api/v4";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "MINERU_TOKEN";

/// Environment variable overriding the API base (e.g. a local proxy).
pub const API_BASE_ENV: &str = "MINERU_API_BASE";

/// Client configuration.
///
/// # Example
/// ```rust
/// use mineru_parse::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .token("my-token")
///     .poll_interval_ms(1000)
///     .max_poll_attempts(600)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_base, "https://mineru.net/api/v4");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token sent on every authenticated call.
    pub token: String,

    /// Service root without a trailing slash. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Delay between two status queries in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// Maximum number of status queries before giving up with
    /// [`ParseError::Timeout`]. Default: 300 (about ten minutes at the
    /// default interval).
    pub max_poll_attempts: u32,

    /// Fail with [`ParseError::UnrecognizedState`] after this many
    /// consecutive status reports carrying an unknown state.
    ///
    /// `None` (the default) keeps polling on unknown states until the attempt
    /// budget runs out.
    pub max_consecutive_unknown: Option<u32>,

    /// Timeout for submission and status calls in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Timeout for the pre-signed upload in seconds. Default: 600.
    pub upload_timeout_secs: u64,

    /// Timeout for downloading a result archive in seconds. Default: 300.
    pub download_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval_ms: 2000,
            max_poll_attempts: 300,
            max_consecutive_unknown: None,
            request_timeout_secs: 30,
            upload_timeout_secs: 600,
            download_timeout_secs: 300,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("api_base", &self.api_base)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("max_consecutive_unknown", &self.max_consecutive_unknown)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a config from `MINERU_TOKEN` and (optionally) `MINERU_API_BASE`.
    pub fn from_env() -> Result<Self, ParseError> {
        let token = std::env::var(TOKEN_ENV).unwrap_or_default();
        let mut builder = Self::builder().token(token);
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                builder = builder.api_base(base);
            }
        }
        builder.build()
    }

    /// Inter-poll delay as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Join an endpoint path onto the API base.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = token.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = n;
        self
    }

    pub fn max_consecutive_unknown(mut self, n: Option<u32>) -> Self {
        self.config.max_consecutive_unknown = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ParseError> {
        let c = &self.config;
        if c.token.trim().is_empty() {
            return Err(ParseError::InvalidConfig(format!(
                "an API token is required (set {TOKEN_ENV} or pass --token)"
            )));
        }
        if !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://")) {
            return Err(ParseError::InvalidConfig(format!(
                "api_base must be an http(s) URL, got '{}'",
                c.api_base
            )));
        }
        if c.max_poll_attempts == 0 {
            return Err(ParseError::InvalidConfig(
                "max_poll_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_consecutive_unknown == Some(0) {
            return Err(ParseError::InvalidConfig(
                "max_consecutive_unknown must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Request options ──────────────────────────────────────────────────────

/// Which extraction backend the service should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    /// Classic layout pipeline.
    Pipeline,
    /// Vision-language model backend. (default)
    #[default]
    Vlm,
}

impl ModelVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVersion::Pipeline => "pipeline",
            ModelVersion::Vlm => "vlm",
        }
    }
}

/// Additional output formats bundled into the result archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFormat {
    Docx,
    Html,
    Latex,
}

/// Per-request parse options, forwarded to the service as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Always sent; defaults to [`ModelVersion::Vlm`].
    pub model_version: ModelVersion,
    pub is_ocr: Option<bool>,
    pub enable_formula: Option<bool>,
    pub enable_table: Option<bool>,
    /// Document language hint, e.g. `"ch"` or `"en"`.
    pub language: Option<String>,
    /// Page ranges in service syntax, e.g. `"2,4-6"`.
    pub page_ranges: Option<String>,
    pub extra_formats: Vec<ExtraFormat>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_version(mut self, v: ModelVersion) -> Self {
        self.model_version = v;
        self
    }

    pub fn ocr(mut self, v: bool) -> Self {
        self.is_ocr = Some(v);
        self
    }

    pub fn formula(mut self, v: bool) -> Self {
        self.enable_formula = Some(v);
        self
    }

    pub fn table(mut self, v: bool) -> Self {
        self.enable_table = Some(v);
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = Some(ranges.into());
        self
    }

    pub fn extra_format(mut self, format: ExtraFormat) -> Self {
        if !self.extra_formats.contains(&format) {
            self.extra_formats.push(format);
        }
        self
    }
}
