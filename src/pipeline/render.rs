//! Page rasterisation at a requested scale.
//!
//! ## Why cap pixels as well as scale?
//!
//! Page sizes vary wildly: an A0 poster at 4× would produce a
//! 13,000 × 9,500 px bitmap. `max_rendered_pixels` caps the longest edge
//! regardless of physical size and the effective scale shrinks to fit.

use crate::engine::{PageSize, SourceDocument};
use crate::error::RenderError;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_index: usize,
    /// Unscaled page size in points.
    pub page_size: PageSize,
    /// Scale actually applied, after the pixel cap.
    pub scale: f32,
    pub image: DynamicImage,
}

#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    max_rendered_pixels: u32,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl Rasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels: max_rendered_pixels.max(1),
        }
    }

    /// Scale after applying the pixel cap to a page of `size`.
    pub fn effective_scale(&self, size: PageSize, scale: f32) -> Result<f32, RenderError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderError::InvalidScale(scale));
        }
        let longest = size.longest_edge() * scale;
        let cap = self.max_rendered_pixels as f32;
        if longest > cap {
            Ok(cap / size.longest_edge())
        } else {
            Ok(scale)
        }
    }

    /// Render page `page_index` (0-based) at `scale`.
    ///
    /// The bitmap is exactly `round(width × s) × round(height × s)` pixels,
    /// where `s` is the effective scale.
    pub fn render<D: SourceDocument>(
        &self,
        document: &D,
        page_index: usize,
        scale: f32,
    ) -> Result<RenderedPage, RenderError> {
        let total = document.page_count();
        if page_index >= total {
            return Err(RenderError::PageOutOfRange {
                page: page_index + 1,
                total,
            });
        }
        let page_size = document.page_size(page_index)?;
        let effective = self.effective_scale(page_size, scale)?;
        if effective < scale {
            debug!(
                "Page {}: scale {} capped to {:.3} ({} px limit)",
                page_index + 1,
                scale,
                effective,
                self.max_rendered_pixels
            );
        }
        let (width, height) = page_size.pixels_at(effective);
        let mut image = document.render_page(page_index, width, height)?;
        if image.width() != width || image.height() != height {
            debug!(
                "Page {}: engine returned {}x{}, resizing to {}x{}",
                page_index + 1,
                image.width(),
                image.height(),
                width,
                height
            );
            image = image.resize_exact(width, height, FilterType::Triangle);
        }
        Ok(RenderedPage {
            page_index,
            page_size,
            scale: effective,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{FakeEngine, FakePdf};
    use crate::engine::PdfEngine;

    #[test]
    fn bitmap_matches_scaled_page_size() {
        let engine = FakeEngine::new();
        let bytes = FakePdf::letter(1, "p").bytes();
        let doc = engine.open(&bytes, None).unwrap();
        let page = Rasterizer::default().render(&doc, 0, 0.5).unwrap();
        assert_eq!((page.image.width(), page.image.height()), (306, 396));
        assert_eq!(page.page_size, PageSize::new(612.0, 792.0));
        assert_eq!(page.scale, 0.5);
    }

    #[test]
    fn oversized_pages_are_capped() {
        let engine = FakeEngine::new();
        let bytes = FakePdf::default().with_page(3370.0, 2384.0, "a0").bytes();
        let doc = engine.open(&bytes, None).unwrap();
        let page = Rasterizer::new(2000).render(&doc, 0, 4.0).unwrap();
        assert_eq!(page.image.width(), 2000);
        assert!(page.scale < 4.0);
    }

    #[test]
    fn engine_size_mismatch_is_corrected() {
        let engine = FakeEngine::new().rendering_at(10, 10);
        let bytes = FakePdf::letter(1, "p").bytes();
        let doc = engine.open(&bytes, None).unwrap();
        let page = Rasterizer::default().render(&doc, 0, 1.0).unwrap();
        assert_eq!((page.image.width(), page.image.height()), (612, 792));
    }

    #[test]
    fn invalid_scales_are_rejected() {
        let engine = FakeEngine::new();
        let bytes = FakePdf::letter(1, "p").bytes();
        let doc = engine.open(&bytes, None).unwrap();
        let r = Rasterizer::default();
        assert_eq!(r.render(&doc, 0, 0.0).unwrap_err(), RenderError::InvalidScale(0.0));
        assert!(matches!(r.render(&doc, 0, -1.0), Err(RenderError::InvalidScale(_))));
        assert!(matches!(r.render(&doc, 0, f32::INFINITY), Err(RenderError::InvalidScale(_))));
    }

    #[test]
    fn page_out_of_range() {
        let engine = FakeEngine::new();
        let bytes = FakePdf::letter(2, "p").bytes();
        let doc = engine.open(&bytes, None).unwrap();
        assert_eq!(
            Rasterizer::default().render(&doc, 2, 1.0).unwrap_err(),
            RenderError::PageOutOfRange { page: 3, total: 2 }
        );
    }

    #[test]
    fn render_failures_surface() {
        let engine = FakeEngine::new();
        let bytes = FakePdf::letter(2, "p").break_page(1).bytes();
        let doc = engine.open(&bytes, None).unwrap();
        assert!(matches!(
            Rasterizer::default().render(&doc, 1, 1.0),
            Err(RenderError::Failed { page: 2, .. })
        ));
    }
}
