#![allow(dead_code)]

//! In-memory engine for unit tests.
//!
//! A fake "PDF" is the JSON encoding of [`FakePdf`]. Rendering fills the
//! requested bitmap with a colour derived from the page label, and image pages
//! written to a [`FakeOutput`] record that colour, so tests can check page
//! order through a flatten or merge without a real PDF library.

use super::{OutputDocument, PageSize, PdfEngine, SourceDocument};
use crate::error::{EngineError, LoadError, RenderError};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FakePage {
    pub width: f32,
    pub height: f32,
    pub label: String,
    /// Rendering this page fails.
    #[serde(default)]
    pub broken: bool,
    /// Set on pages produced by `add_image_page`: the embedded bitmap size.
    #[serde(default)]
    pub raster: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FakePdf {
    pub pages: Vec<FakePage>,
    /// Password needed to open. `Some("")` accepts only an explicit empty
    /// password.
    #[serde(default)]
    pub user_password: Option<String>,
    /// Opens freely but still carries a security handler.
    #[serde(default)]
    pub owner_protected: bool,
    /// Uses a security handler the engine cannot process.
    #[serde(default)]
    pub unsupported_security: bool,
}

impl FakePdf {
    /// US Letter pages labelled `{prefix}1`, `{prefix}2`, …
    pub fn letter(pages: usize, prefix: &str) -> Self {
        Self {
            pages: (1..=pages)
                .map(|n| FakePage {
                    width: 612.0,
                    height: 792.0,
                    label: format!("{prefix}{n}"),
                    ..FakePage::default()
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, width: f32, height: f32, label: &str) -> Self {
        self.pages.push(FakePage {
            width,
            height,
            label: label.to_string(),
            ..FakePage::default()
        });
        self
    }

    pub fn with_user_password(mut self, password: &str) -> Self {
        self.user_password = Some(password.to_string());
        self
    }

    pub fn owner_protected(mut self) -> Self {
        self.owner_protected = true;
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.unsupported_security = true;
        self
    }

    pub fn break_page(mut self, index: usize) -> Self {
        self.pages[index].broken = true;
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }

    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap()
    }

    pub fn labels(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.label.clone()).collect()
    }
}

/// Label written for a rasterised copy of a page labelled `label`.
pub fn raster_label(label: &str) -> String {
    let [r, g, b, _] = label_colour(label).0;
    format!("raster:{r:02x}{g:02x}{b:02x}")
}

fn label_colour(label: &str) -> Rgba<u8> {
    let mut h: u32 = 2166136261;
    for byte in label.bytes() {
        h ^= byte as u32;
        h = h.wrapping_mul(16777619);
    }
    let [r, g, b, _] = h.to_le_bytes();
    Rgba([r, g, b, 255])
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    opens: Cell<usize>,
    /// Fail `add_image_page` once this many pages have been written.
    pub fail_embed_after: Option<usize>,
    /// Return bitmaps of this size regardless of what was requested.
    pub render_size_override: Option<(u32, u32)>,
    /// Refuse every `copy_page`.
    pub fail_copy: bool,
    /// `save` returns bytes no engine can parse.
    pub save_garbage: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `add_image_page` once `pages` pages have been written.
    pub fn failing_embed_after(mut self, pages: usize) -> Self {
        self.fail_embed_after = Some(pages);
        self
    }

    /// Return `width × height` bitmaps whatever size is requested.
    pub fn rendering_at(mut self, width: u32, height: u32) -> Self {
        self.render_size_override = Some((width, height));
        self
    }

    /// Refuse to copy pages out, like a security handler that forbids it.
    pub fn failing_copy(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    pub fn saving_garbage(mut self) -> Self {
        self.save_garbage = true;
        self
    }

    /// Number of `open` calls so far.
    pub fn opens(&self) -> usize {
        self.opens.get()
    }
}

pub struct FakeDocument<'a> {
    engine: &'a FakeEngine,
    pdf: FakePdf,
}

impl SourceDocument for FakeDocument<'_> {
    fn page_count(&self) -> usize {
        self.pdf.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize, RenderError> {
        let page = self.pdf.pages.get(index).ok_or(RenderError::PageOutOfRange {
            page: index + 1,
            total: self.pdf.pages.len(),
        })?;
        Ok(PageSize::new(page.width, page.height))
    }

    fn render_page(&self, index: usize, width: u32, height: u32) -> Result<DynamicImage, RenderError> {
        let page = self.pdf.pages.get(index).ok_or(RenderError::PageOutOfRange {
            page: index + 1,
            total: self.pdf.pages.len(),
        })?;
        if page.broken {
            return Err(RenderError::Failed {
                page: index + 1,
                detail: "broken content stream".into(),
            });
        }
        let (w, h) = self.engine.render_size_override.unwrap_or((width, height));
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            w,
            h,
            label_colour(&page.label),
        )))
    }

    fn is_encrypted(&self) -> bool {
        self.pdf.user_password.is_some() || self.pdf.owner_protected
    }
}

pub struct FakeOutput<'a> {
    engine: &'a FakeEngine,
    pages: Vec<FakePage>,
}

impl OutputDocument for FakeOutput<'_> {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn add_image_page(&mut self, size: PageSize, image: &DynamicImage) -> Result<(), EngineError> {
        if self.engine.fail_embed_after.is_some_and(|n| self.pages.len() >= n) {
            return Err(EngineError("image embedding failed".into()));
        }
        let [r, g, b, _] = image.get_pixel(0, 0).0;
        self.pages.push(FakePage {
            width: size.width,
            height: size.height,
            label: format!("raster:{r:02x}{g:02x}{b:02x}"),
            broken: false,
            raster: Some(image.dimensions()),
        });
        Ok(())
    }

    fn save(&self) -> Result<Vec<u8>, EngineError> {
        if self.engine.save_garbage {
            return Ok(b"%PDF-1.7 truncated".to_vec());
        }
        serde_json::to_vec(&FakePdf {
            pages: self.pages.clone(),
            ..FakePdf::default()
        })
        .map_err(|e| EngineError(e.to_string()))
    }
}

impl PdfEngine for FakeEngine {
    type Document<'a> = FakeDocument<'a>;
    type Output<'a> = FakeOutput<'a>;

    fn open<'a>(&'a self, bytes: &[u8], password: Option<&str>) -> Result<FakeDocument<'a>, LoadError> {
        self.opens.set(self.opens.get() + 1);
        let pdf: FakePdf =
            serde_json::from_slice(bytes).map_err(|e| LoadError::Corrupt(e.to_string()))?;
        if pdf.unsupported_security {
            return Err(LoadError::Unsupported("unknown security handler".into()));
        }
        if let Some(expected) = &pdf.user_password {
            if password != Some(expected.as_str()) {
                return Err(LoadError::Encrypted);
            }
        }
        Ok(FakeDocument { engine: self, pdf })
    }

    fn create<'a>(&'a self) -> Result<FakeOutput<'a>, EngineError> {
        Ok(FakeOutput {
            engine: self,
            pages: Vec::new(),
        })
    }

    fn copy_page(
        &self,
        output: &mut FakeOutput<'_>,
        source: &FakeDocument<'_>,
        page_index: usize,
    ) -> Result<(), EngineError> {
        if self.fail_copy {
            return Err(EngineError("page copy refused".into()));
        }
        let page = source
            .pdf
            .pages
            .get(page_index)
            .ok_or_else(|| EngineError(format!("no page {}", page_index + 1)))?;
        output.pages.push(page.clone());
        Ok(())
    }
}
