//! Input resolution: turn a user-supplied path into an uploadable blob.
//!
//! The upload flow needs two things from a local file: the name the service
//! should record, and the raw bytes for the pre-signed PUT. Reading the file
//! up front means a missing or unreadable file fails before any network call.

use crate::error::ParseError;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A named in-memory file ready for upload.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub bytes: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file, mapping I/O failures onto [`ParseError`] variants.
pub async fn read_local_file(path: impl AsRef<Path>) -> Result<LocalFile, ParseError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
    let name = file_name(path);
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(LocalFile::new(name, bytes))
}

fn io_error(path: &Path, e: std::io::Error) -> ParseError {
    let path = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::NotFound => ParseError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => ParseError::PermissionDenied { path },
        _ => ParseError::Io { path, source: e },
    }
}

/// The final path component, or `"upload.pdf"` when there is none.
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload.pdf".to_string())
}

/// Derive an output archive path for `input` inside `dir`.
///
/// `reports/q3.pdf` → `dir/q3.zip`; URLs use their last path segment. Only
/// document extensions are stripped, so `…/pdf/1706.03762` keeps its dot.
pub fn archive_path_for(input: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{}.zip", archive_stem(input)))
}

/// Archive paths for a whole set of inputs, one per input and all distinct.
///
/// Inputs that would share a name get `-2`, `-3`, … suffixes in order, so
/// `a/report.pdf b/report.pdf` → `report.zip`, `report-2.zip`.
pub fn archive_paths_for(inputs: &[String], dir: &Path) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = archive_stem(input);
            let mut candidate = stem.clone();
            let mut n = 1;
            while !taken.insert(candidate.clone()) {
                n += 1;
                candidate = format!("{stem}-{n}");
            }
            dir.join(format!("{candidate}.zip"))
        })
        .collect()
}

fn archive_stem(input: &str) -> String {
    let name = if is_url(input) {
        reqwest::Url::parse(input).ok().and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
    } else {
        Some(file_name(Path::new(input)))
    };
    name.filter(|s| !s.is_empty())
        .map(|s| strip_document_extension(&s))
        .unwrap_or_else(|| "result".to_string())
}

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "png", "jpg", "jpeg", "html", "htm",
];

fn strip_document_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) =>
        {
            stem.to_string()
        }
        _ => name.to_string(),
    }
}
