//! # mineru-parse
//!
//! Async client for the [MinerU](https://mineru.net) document-parsing API.
//!
//! The service parses PDFs (and office documents) asynchronously: you submit a
//! job, it hands back an identifier, and you poll until the job is `done` or
//! `failed`. This crate turns that multi-step protocol into a couple of
//! `async fn`s that return a typed [`ParseTask`] or a typed [`ParseError`].
//!
//! ## Protocol Overview
//!
//! ```text
//! by URL                          local file
//!  │                               │
//!  ├─ POST /extract/task           ├─ 1. POST /file-urls/batch   (upload slot)
//!  │                               ├─ 2. PUT  <pre-signed URL>    (raw bytes)
//!  └─ GET  /extract/task/{id} ◀┐   └─ 3. GET  /extract-results/batch/{id} ◀┐
//!        every 2 s, ≤ 300×  ───┘          every 2 s, ≤ 300×  ─────────────┘
//!
//!  done   → ParseTask { result_url, .. }  → download_result()
//!  failed → ParseError::TaskFailed
//!  budget → ParseError::Timeout
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mineru_parse::{ClientConfig, ParseClient, ParseOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Token from MINERU_TOKEN; MINERU_API_BASE overrides the service root.
//!     let client = ParseClient::new(ClientConfig::from_env()?)?;
//!     let options = ParseOptions::default().formula(true).table(true);
//!     let task = client
//!         .parse_by_url("https://arxiv.org/pdf/1706.03762", &options, None, &CancellationToken::new())
//!         .await?;
//!     println!("result: {:?}", task.result_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mineru` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mineru-parse = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod input;
pub mod poll;
pub mod progress;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{HttpApi, ParseApi, UploadSlot};
pub use client::ParseClient;
pub use config::{ClientConfig, ClientConfigBuilder, ExtraFormat, ModelVersion, ParseOptions};
pub use error::ParseError;
pub use input::LocalFile;
pub use progress::{NoopProgressCallback, ParseProgressCallback, ProgressCallback};
pub use task::{ExtractProgress, ParseTask, TaskState};
pub use tokio_util::sync::CancellationToken;
