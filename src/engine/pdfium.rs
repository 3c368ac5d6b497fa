//! PDFium-backed [`PdfEngine`].
//!
//! PDFium keeps thread-local state and is not async-safe. Every async entry
//! point in this crate binds and drives a `PdfiumEngine` inside
//! `tokio::task::spawn_blocking`.

use super::{OutputDocument, PageSize, PdfEngine, SourceDocument};
use crate::error::{EngineError, LoadError, RenderError, UnlockError};
use image::DynamicImage;
use pdfium_locate::LocateOptions;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// A bound PDFium library.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl std::fmt::Debug for PdfiumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PdfiumEngine")
    }
}

impl PdfiumEngine {
    pub fn new(pdfium: Pdfium) -> Self {
        Self { pdfium }
    }

    /// Bind the cached (or freshly downloaded) PDFium, falling back to the
    /// system library.
    pub fn bind() -> Result<Self, UnlockError> {
        pdfium_locate::bind(&LocateOptions::default())
            .map(Self::new)
            .map_err(|e| UnlockError::PdfiumBindingFailed(e.to_string()))
    }

    /// Bind the library at an explicit path.
    pub fn bind_path(path: &Path) -> Result<Self, UnlockError> {
        pdfium_locate::bind_path(path)
            .map(Self::new)
            .map_err(|e| UnlockError::PdfiumBindingFailed(e.to_string()))
    }
}

fn classify(err: PdfiumError) -> LoadError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => LoadError::Encrypted,
        PdfiumError::PdfiumLibraryInternalError(
            inner @ (PdfiumInternalError::FormatError | PdfiumInternalError::FileError),
        ) => LoadError::Corrupt(format!("{inner:?}")),
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::SecurityError) => {
            LoadError::Unsupported("unsupported security handler".to_string())
        }
        other => LoadError::Unsupported(format!("{other:?}")),
    }
}

fn engine_err(context: &str, err: PdfiumError) -> EngineError {
    EngineError(format!("{context}: {err:?}"))
}

/// A document opened by PDFium.
pub struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
    encrypted: bool,
}

impl<'a> PdfiumDocument<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, RenderError> {
        let total = self.page_count();
        if index >= total {
            return Err(RenderError::PageOutOfRange {
                page: index + 1,
                total,
            });
        }
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| RenderError::Failed {
                page: index + 1,
                detail: format!("{e:?}"),
            })
    }
}

impl SourceDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, RenderError> {
        let page = self.page(index)?;
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    fn render_page(&self, index: usize, width: u32, height: u32) -> Result<DynamicImage, RenderError> {
        let page = self.page(index)?;
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::Failed {
                page: index + 1,
                detail: format!("{e:?}"),
            })?;
        Ok(bitmap.as_image())
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

/// A new document being written by PDFium.
pub struct PdfiumOutput<'a> {
    document: PdfDocument<'a>,
}

impl OutputDocument for PdfiumOutput<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn add_image_page(&mut self, size: PageSize, image: &DynamicImage) -> Result<(), EngineError> {
        let width = PdfPoints::new(size.width);
        let height = PdfPoints::new(size.height);
        let mut page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(|e| engine_err("adding page", e))?;
        page.objects_mut()
            .create_image_object(PdfPoints::ZERO, PdfPoints::ZERO, image, Some(width), Some(height))
            .map_err(|e| engine_err("embedding image", e))?;
        Ok(())
    }

    fn save(&self) -> Result<Vec<u8>, EngineError> {
        self.document
            .save_to_bytes()
            .map_err(|e| engine_err("saving document", e))
    }
}

impl PdfEngine for PdfiumEngine {
    type Document<'a> = PdfiumDocument<'a>;
    type Output<'a> = PdfiumOutput<'a>;

    fn open<'a>(&'a self, bytes: &[u8], password: Option<&str>) -> Result<PdfiumDocument<'a>, LoadError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes.to_vec(), password)
            .map_err(classify)?;
        let encrypted = !matches!(
            document.permissions().security_handler_revision(),
            Ok(PdfSecurityHandlerRevision::Unprotected) | Err(_)
        );
        debug!(
            "Opened PDF: {} pages, encrypted={}",
            document.pages().len(),
            encrypted
        );
        Ok(PdfiumDocument { document, encrypted })
    }

    fn create<'a>(&'a self) -> Result<PdfiumOutput<'a>, EngineError> {
        let document = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| engine_err("creating document", e))?;
        Ok(PdfiumOutput { document })
    }

    fn copy_page(
        &self,
        output: &mut PdfiumOutput<'_>,
        source: &PdfiumDocument<'_>,
        page_index: usize,
    ) -> Result<(), EngineError> {
        let destination = output.document.pages().len();
        output
            .document
            .pages_mut()
            .copy_page_from_document(&source.document, page_index as u16, destination)
            .map_err(|e| engine_err(&format!("copying page {}", page_index + 1), e))
    }
}
