//! Output types, file naming and atomic writes.

use crate::error::UnlockError;
use crate::progress::Operation;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// How a file's bytes were made openable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockMethod {
    /// Not protected; original bytes kept.
    PassThrough,
    /// Pages copied out losslessly with a password.
    Decrypted,
    /// Re-rendered as page images.
    Flattened,
}

impl UnlockMethod {
    pub fn operation(self) -> Operation {
        match self {
            UnlockMethod::PassThrough | UnlockMethod::Decrypted => Operation::Decrypt,
            UnlockMethod::Flattened => Operation::Flatten,
        }
    }
}

/// Result of unlocking one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockOutput {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub method: UnlockMethod,
    pub duration_ms: u64,
}

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Default name for an output file: `{prefix}-{stem}.{ext}`.
///
/// The stem comes from the original file name, sanitised to a portable
/// charset; without a usable name a local timestamp is used instead.
pub fn output_filename(operation: Operation, original: Option<&str>, ext: &str) -> String {
    output_filename_at(operation, original, ext, Local::now())
}

pub fn output_filename_at(
    operation: Operation,
    original: Option<&str>,
    ext: &str,
    now: DateTime<Local>,
) -> String {
    let stem = original
        .and_then(|name| Path::new(name).file_stem())
        .map(|s| UNSAFE_CHARS.replace_all(&s.to_string_lossy(), "_").trim_matches('_').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| now.format("%Y%m%d-%H%M%S").to_string());
    format!("{}-{}.{}", operation.file_prefix(), stem, ext)
}

/// Write `bytes` to `path` via a temp file in the same directory and a rename,
/// so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), UnlockError> {
    let fail = |source: std::io::Error| UnlockError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(fail)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// Async [`write_atomic`].
pub async fn write_output(path: &Path, bytes: Vec<u8>) -> Result<(), UnlockError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&owned, &bytes))
        .await
        .map_err(|e| UnlockError::Internal(format!("Write task panicked: {e}")))?
}
