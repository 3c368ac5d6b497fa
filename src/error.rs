//! Error types for the pdfunlock library.
//!
//! One enum per failure domain, mirroring how each failure is handled:
//!
//! * [`LoadError`] — recoverable: retry with a password, or fall back to
//!   flattening.
//! * [`RenderError`] — fatal for the current document's flatten/thumbnail
//!   run, never for the batch.
//! * [`FlattenError`] — escalates to a password prompt in batch intake.
//! * [`AssemblyError`] — fatal for a merge/split; there is no safe partial
//!   output.
//! * [`UnlockError`] — top-level errors returned by the entry points.

use std::path::PathBuf;
use thiserror::Error;

/// Why a document could not be opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The document is encrypted and no usable password was supplied.
    #[error("document is encrypted and requires a password")]
    Encrypted,

    /// A password was supplied but does not open the document.
    #[error("wrong password")]
    WrongPassword,

    /// Header, xref or trailer cannot be parsed.
    #[error("document is corrupt: {0}")]
    Corrupt(String),

    /// Unsupported security handler or an unclassified engine failure.
    ///
    /// Callers short-circuit to flattening instead of retrying.
    #[error("document uses an unsupported feature: {0}")]
    Unsupported(String),
}

impl LoadError {
    /// `true` for failures a password (or flattening) might still resolve.
    pub fn is_password_failure(&self) -> bool {
        matches!(self, LoadError::Encrypted | LoadError::WrongPassword)
    }
}

/// Rasterisation failure for one page.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("render scale must be a positive finite number, got {0}")]
    InvalidScale(f32),

    #[error("page {page}: rasterisation failed: {detail}")]
    Failed { page: usize, detail: String },
}

/// Failure reported by an output document (add page, embed, copy, save).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

/// Flattening aborted; no partial output exists.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlattenError {
    #[error("cannot open source for flattening: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// Writing page `page` into the output document failed.
    #[error("page {page}: writing the output page failed: {detail}")]
    Embed { page: usize, detail: String },

    #[error("creating the output document failed: {0}")]
    Create(String),

    #[error("serialising the flattened document failed: {0}")]
    Save(String),

    #[error("document has no pages to flatten")]
    EmptyDocument,

    #[error("flattening was cancelled after {completed} of {total} pages")]
    Cancelled { completed: usize, total: usize },
}

/// Thumbnail generation failed for one file.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ThumbnailError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("page {page}: thumbnail encoding failed: {detail}")]
    Encode { page: usize, detail: String },
}

/// Merge/split failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssemblyError {
    /// A page reference points at a file with no loaded document.
    ///
    /// Indicates a stale reference after a file removal.
    #[error("page '{page_id}' refers to file #{file_index}, which is not loaded")]
    MissingSource { page_id: String, file_index: usize },

    #[error("page '{page_id}' refers to page {page_index} of file #{file_index}, which has {total} pages")]
    PageOutOfRange {
        page_id: String,
        file_index: usize,
        page_index: usize,
        total: usize,
    },

    #[error("nothing to assemble: no pages selected")]
    NoPages,

    #[error("cannot open source: {0}")]
    Open(#[from] LoadError),

    #[error("cannot open file #{file_index} ('{name}'): {source}")]
    Load {
        file_index: usize,
        name: String,
        #[source]
        source: LoadError,
    },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("output document: {0}")]
    Engine(#[from] EngineError),

    #[error("ZIP archive: {0}")]
    Archive(String),
}

/// All fatal errors returned by the pdfunlock entry points.
#[derive(Debug, Error)]
pub enum UnlockError {
    // ── Input errors ──────────────────────────────────────────────────────
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Pipeline errors ───────────────────────────────────────────────────
    #[error("'{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error("'{name}': {source}")]
    Flatten {
        name: String,
        #[source]
        source: FlattenError,
    },

    #[error("'{name}': {source}")]
    Thumbnail {
        name: String,
        #[source]
        source: ThumbnailError,
    },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// Intake finished without producing the file.
    #[error("'{name}' was not unlocked: {reason}\nSupply the password with --password (add --force to flatten).")]
    Rejected { name: String, reason: String },

    // ── Coordination errors ───────────────────────────────────────────────
    /// Another operation holds the progress tracker.
    #[error("Another operation is already running: {running}")]
    Busy { running: String },

    /// Batch intake is paused on a password prompt.
    #[error("Waiting for a password for '{file_name}'; submit or cancel it first")]
    AwaitingPassword { file_name: String },

    /// No password prompt is pending.
    #[error("No file is waiting for a password")]
    NotAwaitingPassword,

    #[error("File index {index} is out of range (workspace has {len} files)")]
    FileIndexOutOfRange { index: usize, len: usize },

    #[error("Page '{id}' is not in the workspace")]
    UnknownPage { id: String },

    #[error("Invalid page order: {0}")]
    InvalidOrder(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}
