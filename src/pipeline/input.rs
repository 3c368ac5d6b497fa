//! Input resolution: read a user-supplied path into a [`SourceFile`].
//!
//! The `%PDF` magic is checked up front so a mistyped path gives a
//! meaningful error rather than an engine failure several stages later.
//! Files whose trailer or xref is damaged still pass here; the loader
//! classifies those as corrupt.

use crate::error::UnlockError;
use crate::workspace::SourceFile;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read a local PDF, validating existence, permissions and magic bytes.
pub fn read_source_file(path: &Path) -> Result<SourceFile, UnlockError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(UnlockError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(UnlockError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };
    check_magic(path, &bytes)?;
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceFile::new(display_name(path), bytes))
}

/// Async variant of [`read_source_file`] for the tokio entry points.
pub async fn load_source_file(path: &Path) -> Result<SourceFile, UnlockError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_source_file(&owned))
        .await
        .map_err(|e| UnlockError::Internal(format!("Read task panicked: {e}")))?
}

fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), UnlockError> {
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(UnlockError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// The file name shown in the grid and used for output naming.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}
