//! Pipeline stages for unlocking, flattening, merging and splitting PDFs.
//!
//! Each submodule implements one transformation step against the
//! [`crate::engine::PdfEngine`] seam. All of them are synchronous; the async
//! entry points run them inside `spawn_blocking`.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ decrypt ──────────────┐
//! input ──▶ loader                     ├──▶ thumbnail ──▶ workspace
//!  (path)    └─▶ render ──▶ flatten ───┘                     │
//!                                              assemble ◀────┤
//!                                              split    ◀────┘
//! ```
//!
//! 1. [`input`]     — read a path into a `SourceFile`, checking the magic bytes
//! 2. [`loader`]    — open with the no-password → password/empty fallback chain
//! 3. [`render`]    — rasterise one page at a scale, capped in pixels
//! 4. [`flatten`]   — rebuild a document as full-page images
//! 5. [`decrypt`]   — lossless unlock by copying pages out with a password
//! 6. [`encode`]    — PNG / base64 data-URI encoding
//! 7. [`thumbnail`] — page references with thumbnails for the grid
//! 8. [`assemble`]  — merge page references into one document
//! 9. [`split`]     — split, extract, page images, ZIP packaging

pub mod assemble;
pub mod decrypt;
pub mod encode;
pub mod flatten;
pub mod input;
pub mod loader;
pub mod render;
pub mod split;
pub mod thumbnail;
