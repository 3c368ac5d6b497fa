//! The PDF engine seam.
//!
//! Parsing, rasterising and writing PDFs are external capabilities. The
//! pipeline talks to them only through [`PdfEngine`], [`SourceDocument`] and
//! [`OutputDocument`], so every stage can be exercised without a PDFium
//! binary and the production backend ([`pdfium::PdfiumEngine`]) stays a thin
//! adapter.
//!
//! ## Rendering is sequential
//!
//! Nothing here is required to be `Sync`. Page renders within one call run
//! one after another; a parallel rasteriser would need a backend whose
//! documents can be shared across threads, which PDFium's are not.

pub mod pdfium;

#[cfg(test)]
pub(crate) mod fake;

use crate::error::{EngineError, LoadError, RenderError};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Page dimensions in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions at `scale`, rounded, never smaller than 1×1.
    pub fn pixels_at(&self, scale: f32) -> (u32, u32) {
        let w = (self.width * scale).round().max(1.0);
        let h = (self.height * scale).round().max(1.0);
        (w as u32, h as u32)
    }

    pub fn longest_edge(&self) -> f32 {
        self.width.max(self.height)
    }
}

/// An opened, paged document.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Unscaled size of page `index` (0-based).
    fn page_size(&self, index: usize) -> Result<PageSize, RenderError>;

    /// Rasterise page `index` into a `width × height` bitmap.
    fn render_page(&self, index: usize, width: u32, height: u32) -> Result<DynamicImage, RenderError>;

    /// Whether the source file carries a security handler, even if it opened
    /// without an explicit password.
    fn is_encrypted(&self) -> bool;
}

/// A new, unencrypted document under construction.
pub trait OutputDocument {
    fn page_count(&self) -> usize;

    /// Append a page of `size` points whose whole area is `image`.
    fn add_image_page(&mut self, size: PageSize, image: &DynamicImage) -> Result<(), EngineError>;

    fn save(&self) -> Result<Vec<u8>, EngineError>;
}

/// Factory for source and output documents.
pub trait PdfEngine {
    type Document<'a>: SourceDocument
    where
        Self: 'a;
    type Output<'a>: OutputDocument
    where
        Self: 'a;

    /// One open attempt.
    ///
    /// Any password failure is reported as [`LoadError::Encrypted`];
    /// [`crate::pipeline::loader`] refines it into
    /// [`LoadError::WrongPassword`] when a password was supplied.
    fn open<'a>(&'a self, bytes: &[u8], password: Option<&str>) -> Result<Self::Document<'a>, LoadError>;

    fn create<'a>(&'a self) -> Result<Self::Output<'a>, EngineError>;

    /// Append page `page_index` of `source` to the end of `output`.
    fn copy_page(
        &self,
        output: &mut Self::Output<'_>,
        source: &Self::Document<'_>,
        page_index: usize,
    ) -> Result<(), EngineError>;
}
