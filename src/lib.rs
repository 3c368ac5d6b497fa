//! # pdfunlock
//!
//! Unlock, flatten, merge and split PDF documents.
//!
//! ## Why flatten?
//!
//! Many "protected" PDFs only carry an owner password that restricts
//! printing or copying; they open with an empty user password. Others use
//! security handlers that PDF tools refuse to rewrite. Rendering every page
//! to an image and rebuilding the document from those images always produces
//! an unencrypted file the size of the original pages, at the cost of text
//! selectability. This crate tries the lossless routes first and flattens
//! only when they fail.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Load      no password → supplied password or "" (pdfium, spawn_blocking)
//!  ├─ 2. Unlock    pass through / lossless page copy / flatten to page images
//!  ├─ 3. Thumbs    one PageReference + PNG data URI per page
//!  ├─ 4. Arrange   reorder, remove, drag pages across files in a Workspace
//!  └─ 5. Output    merge to one PDF, split to parts, or export page PNGs
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfunlock::{unlock, UnlockConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UnlockConfig::builder().password("hunter2").build()?;
//!     let output = unlock("statement.pdf", &config).await?;
//!     std::fs::write("unlocked-statement.pdf", &output.bytes)?;
//!     eprintln!("{} pages, {:?}, {}ms", output.page_count, output.method, output.duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! Interactive hosts drive [`IntakeCoordinator`] directly: it pauses on
//! files that need a password and resumes when one is submitted.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfunlock` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfunlock = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{
    export_images, flatten_file, flatten_in_workspace, flatten_sync, flatten_to_file, inspect, merge_files, split_file,
    unlock, unlock_sync, unlock_to_file,
};
pub use config::{PageSelection, UnlockConfig, UnlockConfigBuilder};
pub use engine::pdfium::PdfiumEngine;
pub use engine::{OutputDocument, PageSize, PdfEngine, SourceDocument};
pub use error::{AssemblyError, FlattenError, LoadError, RenderError, ThumbnailError, UnlockError};
pub use intake::{IntakeCoordinator, IntakeOutcome, IntakeReport, IntakeState, UnlockAttempt};
pub use output::{output_filename, UnlockMethod, UnlockOutput};
pub use pipeline::flatten::CancelFlag;
pub use pipeline::loader::DocumentInfo;
pub use pipeline::split::{SplitMode, SplitPart};
pub use progress::{
    Operation, ProcessingProgress, ProgressCallback, ProgressEvent, ProgressTracker, UnlockProgressCallback,
};
pub use stream::{flatten_stream, FlattenEvent, FlattenStream};
pub use workspace::{PageReference, SourceFile, Thumbnail, Workspace, WorkspaceSnapshot};
