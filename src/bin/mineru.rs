//! CLI binary for mineru-parse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClientConfig` / `ParseOptions` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mineru_parse::config::{API_BASE_ENV, DEFAULT_API_BASE, TOKEN_ENV};
use mineru_parse::input::{archive_paths_for, is_url};
use mineru_parse::{
    CancellationToken, ClientConfig, ExtraFormat, ExtractProgress, ModelVersion, ParseClient,
    ParseError, ParseOptions, ParseProgressCallback, ParseTask, TaskState,
};
use std::future::Future;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Per-input terminal progress: a spinner until the service reports a page
/// total, then a page bar. One instance per input, all attached to a shared
/// [`MultiProgress`] so concurrent parses render as stacked lines.
struct CliProgress {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgress {
    fn new(multi: &MultiProgress, label: &str) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix(truncate(label, 32));
        bar.set_message("submitting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            started: Instant::now(),
        }
    }

    fn activate_bar(&self, total: u64) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:36.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total);
        self.bar.set_style(style);
    }

    fn fail(&self, reason: &str) {
        self.bar.abandon_with_message(red(&format!("✗ {}", truncate(reason, 80))));
    }
}

impl ParseProgressCallback for CliProgress {
    fn on_submitted(&self, id: &str) {
        self.bar.set_message(format!("submitted {}", dim(id)));
    }

    fn on_uploaded(&self, _batch_id: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} uploaded {}",
            cyan("↑"),
            dim(&format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0))
        ));
    }

    fn on_poll(&self, attempt: u32, max_attempts: u32, state: &TaskState) {
        self.bar
            .set_message(format!("{state}  {}", dim(&format!("poll {attempt}/{max_attempts}"))));
    }

    fn on_progress(&self, progress: &ExtractProgress) {
        let total = u64::from(progress.total_pages);
        if self.bar.length() != Some(total) {
            self.activate_bar(total);
        }
        self.bar.set_position(u64::from(progress.extracted_pages));
    }

    fn on_finished(&self, _task: &ParseTask) {
        self.bar.finish_with_message(format!(
            "{} {}",
            green("✓"),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
        ));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a PDF by URL and print the result archive URL
  mineru parse https://arxiv.org/pdf/1706.03762

  # Upload local files (three at a time) and save the archives
  mineru parse a.pdf b.pdf c.pdf --download-dir out/

  # OCR, first ten pages, with an extra DOCX export
  mineru parse --ocr --pages 1-10 --extra-format docx scan.pdf

  # Machine-readable output
  mineru parse --json paper.pdf > result.json

  # One-off status queries
  mineru status --task 2f6a0c1e-...
  mineru status --batch 8c1d2e3f-...

  # Fetch a result archive
  mineru download https://cdn-mineru.openxlab.org.cn/pdf/xxx.zip -o result.zip

ENVIRONMENT VARIABLES:
  MINERU_TOKEN            API token (required)
  MINERU_API_BASE         Service root (default: https://mineru.net/api/v4)
  RUST_LOG                Override the log filter (e.g. mineru_parse=debug)

Press Ctrl-C to cancel in-flight parses; tasks already submitted keep running
on the service and can be queried later with `mineru status`.
"#;

/// Parse documents with the MinerU service.
#[derive(Parser, Debug)]
#[command(
    name = "mineru",
    version,
    about = "Parse PDFs and office documents with the MinerU API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API token.
    #[arg(long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// Service root URL.
    #[arg(long, global = true, env = API_BASE_ENV, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Delay between status queries in milliseconds.
    #[arg(long, global = true, env = "MINERU_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Maximum status queries per job before giving up.
    #[arg(long, global = true, env = "MINERU_MAX_ATTEMPTS", default_value_t = 300)]
    max_attempts: u32,

    /// Fail after this many consecutive unrecognised states (default: never).
    #[arg(long, global = true, env = "MINERU_MAX_UNKNOWN_STATES")]
    max_unknown_states: Option<u32>,

    /// Timeout for JSON API calls in seconds.
    #[arg(long, global = true, env = "MINERU_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Timeout for the file upload in seconds.
    #[arg(long, global = true, env = "MINERU_UPLOAD_TIMEOUT", default_value_t = 600)]
    upload_timeout: u64,

    /// Timeout for result downloads in seconds.
    #[arg(long, global = true, env = "MINERU_DOWNLOAD_TIMEOUT", default_value_t = 300)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MINERU_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "MINERU_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit URLs or upload local files and wait for them to finish.
    Parse(ParseArgs),
    /// Query a task or batch once.
    Status(StatusArgs),
    /// Download a result archive.
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Save each result archive as `<DIR>/<stem>.zip`.
    #[arg(short = 'd', long, env = "MINERU_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Number of inputs parsed concurrently.
    #[arg(short, long, env = "MINERU_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Extraction backend.
    #[arg(long, value_enum, default_value = "vlm")]
    model: ModelArg,

    /// Force OCR.
    #[arg(long)]
    ocr: bool,

    /// Formula recognition (service default when unset).
    #[arg(long, value_name = "BOOL")]
    formula: Option<bool>,

    /// Table recognition (service default when unset).
    #[arg(long, value_name = "BOOL")]
    table: Option<bool>,

    /// Document language hint, e.g. `ch` or `en`.
    #[arg(long)]
    language: Option<String>,

    /// Page ranges, e.g. `2,4-6`.
    #[arg(long)]
    pages: Option<String>,

    /// Extra export bundled into the archive (repeatable).
    #[arg(long = "extra-format", value_enum)]
    extra_formats: Vec<FormatArg>,

    /// Output structured JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "MINERU_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Task id returned by a URL submission.
    #[arg(long, conflicts_with = "batch", required_unless_present = "batch")]
    task: Option<String>,

    /// Batch id returned by an upload.
    #[arg(long)]
    batch: Option<String>,

    /// Output structured JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Result archive URL (`full_zip_url`).
    url: String,

    /// Destination file.
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModelArg {
    Pipeline,
    Vlm,
}

impl From<ModelArg> for ModelVersion {
    fn from(v: ModelArg) -> Self {
        match v {
            ModelArg::Pipeline => ModelVersion::Pipeline,
            ModelArg::Vlm => ModelVersion::Vlm,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Docx,
    Html,
    Latex,
}

impl From<FormatArg> for ExtraFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Docx => ExtraFormat::Docx,
            FormatArg::Html => ExtraFormat::Html,
            FormatArg::Latex => ExtraFormat::Latex,
        }
    }
}

/// Result line for one input, also the `--json` schema.
#[derive(Serialize)]
struct Outcome {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<ParseTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Progress bars replace INFO-level library logs; verbose always wins.
    let show_progress = match &cli.command {
        Command::Parse(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let client = ParseClient::new(config).context("Failed to create client")?;

    // ── Ctrl-C → cancel in-flight work; a second Ctrl-C exits ────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            eprintln!("{} cancelling… (Ctrl-C again to quit)", cyan("⚠"));
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    }

    match &cli.command {
        Command::Parse(args) => run_parse(&client, args, show_progress, cli.quiet, &cancel).await,
        Command::Status(args) => run_status(&client, args).await,
        Command::Download(args) => run_download(&client, args, cli.quiet, &cancel).await,
    }
}

/// Map global CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let token = cli.token.clone().unwrap_or_default();
    if token.trim().is_empty() {
        anyhow::bail!("No API token: pass --token or set {TOKEN_ENV}");
    }
    ClientConfig::builder()
        .token(token)
        .api_base(cli.api_base.clone())
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_attempts(cli.max_attempts)
        .max_consecutive_unknown(cli.max_unknown_states)
        .request_timeout_secs(cli.request_timeout)
        .upload_timeout_secs(cli.upload_timeout)
        .download_timeout_secs(cli.download_timeout)
        .build()
        .context("Invalid configuration")
}

/// Map parse flags to `ParseOptions`.
fn build_options(args: &ParseArgs) -> ParseOptions {
    let mut options = ParseOptions::new().model_version(args.model.into());
    if args.ocr {
        options = options.ocr(true);
    }
    if let Some(v) = args.formula {
        options = options.formula(v);
    }
    if let Some(v) = args.table {
        options = options.table(v);
    }
    if let Some(ref lang) = args.language {
        options = options.language(lang.clone());
    }
    if let Some(ref pages) = args.pages {
        options = options.page_ranges(pages.clone());
    }
    for f in &args.extra_formats {
        options = options.extra_format((*f).into());
    }
    options
}

// ── parse ────────────────────────────────────────────────────────────────────

async fn run_parse(
    client: &ParseClient,
    args: &ParseArgs,
    show_progress: bool,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let options = build_options(args);
    let multi = MultiProgress::new();
    // Names are fixed up front so concurrent inputs never share an archive.
    let archives = args
        .download_dir
        .as_deref()
        .map(|dir| archive_paths_for(&args.inputs, dir))
        .unwrap_or_default();
    let options = &options;
    let multi = &multi;
    let archives = &archives;

    let outcomes: Vec<Outcome> = stream::iter(args.inputs.iter().enumerate())
        .map(|(i, input)| async move {
            let bar = show_progress.then(|| CliProgress::new(multi, &label_for(input)));
            let progress = bar.as_ref().map(|b| b as &dyn ParseProgressCallback);
            let archive = archives.get(i).map(PathBuf::as_path);
            let outcome = parse_one(client, input, options, progress, archive, cancel).await;
            if let (Some(bar), Some(err)) = (&bar, &outcome.error) {
                bar.fail(err);
            }
            outcome
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();

    if args.json {
        let json = serde_json::to_string_pretty(&outcomes).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        for o in &outcomes {
            print_outcome(o);
        }
        if !quiet {
            let ok = outcomes.len() - failed;
            eprintln!(
                "{} {}/{} parsed",
                if failed == 0 { green("✔") } else { red("✘") },
                bold(&ok.to_string()),
                outcomes.len()
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} inputs failed", outcomes.len());
    }
    Ok(())
}

async fn parse_one(
    client: &ParseClient,
    input: &str,
    options: &ParseOptions,
    progress: Option<&dyn ParseProgressCallback>,
    archive: Option<&Path>,
    cancel: &CancellationToken,
) -> Outcome {
    let mut outcome = Outcome {
        input: input.to_string(),
        task: None,
        archive: None,
        error: None,
        retryable: false,
    };

    let parsed = if is_url(input) {
        client.parse_by_url(input, options, progress, cancel).await
    } else {
        client.parse_local_file(input, options, progress, cancel).await
    };
    let task = match parsed {
        Ok(task) => task,
        Err(e) => {
            outcome.retryable = e.is_retryable();
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };

    if let (Some(path), Some(url)) = (archive, task.result_url.as_deref()) {
        let download = client.download_result_to_file(url, path);
        match until_cancelled(cancel, url, download).await {
            Ok(_) => outcome.archive = Some(path.to_path_buf()),
            Err(e) => {
                outcome.retryable = e.is_retryable();
                outcome.error = Some(e.to_string());
            }
        }
    }
    outcome.task = Some(task);
    outcome
}

/// Race `fut` against `cancel`; the library's downloads take no token.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    id: &str,
    fut: impl Future<Output = Result<T, ParseError>>,
) -> Result<T, ParseError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ParseError::Cancelled { id: id.to_string() }),
        result = fut => result,
    }
}

fn label_for(input: &str) -> String {
    if is_url(input) {
        input.rsplit('/').find(|s| !s.is_empty()).unwrap_or(input).to_string()
    } else {
        Path::new(input)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string())
    }
}

fn print_outcome(o: &Outcome) {
    match (&o.error, &o.task) {
        (Some(err), _) => {
            let hint = if o.retryable { dim("  (retryable)") } else { String::new() };
            eprintln!("{} {}  {}{}", red("✗"), bold(&o.input), red(err), hint);
        }
        (None, Some(task)) => {
            println!("{} {}", green("✓"), bold(&o.input));
            println!("    id      {}", task.task_id);
            if let Some(ref url) = task.result_url {
                println!("    result  {url}");
            }
            if let Some(ref path) = o.archive {
                println!("    saved   {}", path.display());
            }
        }
        (None, None) => {}
    }
}

// ── status ───────────────────────────────────────────────────────────────────

async fn run_status(client: &ParseClient, args: &StatusArgs) -> Result<()> {
    let tasks = match (&args.task, &args.batch) {
        (Some(id), _) => vec![client
            .get_task_status(id)
            .await
            .with_context(|| format!("Failed to query task {id}"))?],
        (None, Some(id)) => client
            .get_batch_status(id)
            .await
            .with_context(|| format!("Failed to query batch {id}"))?,
        (None, None) => anyhow::bail!("Pass --task or --batch"),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&tasks).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if tasks.is_empty() {
        eprintln!("{} no results yet", dim("·"));
    }
    for task in &tasks {
        print_task(task);
    }
    Ok(())
}

fn print_task(task: &ParseTask) {
    let state = match task.state {
        TaskState::Done => green(task.state.as_str()),
        TaskState::Failed => red(task.state.as_str()),
        _ => cyan(task.state.as_str()),
    };
    println!("{}  {}", bold(&task.task_id), state);
    if let Some(ref name) = task.file_name {
        println!("    file      {name}");
    }
    if let Some(ref p) = task.progress {
        println!(
            "    progress  {}/{} pages ({:.0}%)",
            p.extracted_pages,
            p.total_pages,
            p.fraction() * 100.0
        );
    }
    if let Some(ref url) = task.result_url {
        println!("    result    {url}");
    }
    if let Some(ref msg) = task.error_message {
        println!("    error     {}", red(msg));
    }
}

// ── download ─────────────────────────────────────────────────────────────────

async fn run_download(
    client: &ParseClient,
    args: &DownloadArgs,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let download = client.download_result_to_file(&args.url, &args.output);
    let written = until_cancelled(cancel, &args.url, download)
        .await
        .context("Download failed")?;
    if !quiet {
        eprintln!(
            "{}  {} bytes  →  {}",
            green("✔"),
            written,
            bold(&args.output.display().to_string())
        );
    }
    Ok(())
}
