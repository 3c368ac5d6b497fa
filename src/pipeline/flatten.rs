//! Flattening: re-create a document as one full-page image per source page.
//!
//! The output is a new, unencrypted document. Page `i` has the exact size in
//! points of source page `i` and its whole area is the bitmap rendered at the
//! flatten scale, so it prints at the original physical size. Text,
//! annotations, form fields and the security handler are all gone.
//!
//! Nothing is returned on failure: a half-built document never escapes.

use crate::engine::{OutputDocument, PdfEngine, SourceDocument};
use crate::error::FlattenError;
use crate::pipeline::loader;
use crate::pipeline::render::Rasterizer;
use crate::progress::{percent_of, ProgressFn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cooperative cancellation, checked before each page.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Flattens documents through one engine.
pub struct Flattener<'e, E> {
    engine: &'e E,
    scale: f32,
    rasterizer: Rasterizer,
    cancel: Option<CancelFlag>,
}

impl<'e, E: PdfEngine> Flattener<'e, E> {
    pub fn new(engine: &'e E, scale: f32) -> Self {
        Self {
            engine,
            scale,
            rasterizer: Rasterizer::default(),
            cancel: None,
        }
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.rasterizer = Rasterizer::new(px);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Flatten `bytes` and return the new document's bytes.
    ///
    /// With an explicit `password` only that password is tried. Without one
    /// the loader's no-password then empty-password chain applies.
    ///
    /// Reports `percent_of(i, N)` with "Flattening page i of N" after each
    /// page is embedded.
    pub fn flatten(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        on_progress: ProgressFn<'_>,
    ) -> Result<Vec<u8>, FlattenError> {
        let source = match password {
            Some(p) => loader::open_once(self.engine, bytes, Some(p))?,
            None => loader::load(self.engine, bytes, None)?.document,
        };
        let total = source.page_count();
        if total == 0 {
            return Err(FlattenError::EmptyDocument);
        }
        info!("Flattening {} pages at {}x", total, self.scale);

        let mut output = self
            .engine
            .create()
            .map_err(|e| FlattenError::Create(e.to_string()))?;

        for index in 0..total {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                info!("Flattening cancelled after {} of {} pages", index, total);
                return Err(FlattenError::Cancelled {
                    completed: index,
                    total,
                });
            }
            let page = self.rasterizer.render(&source, index, self.scale)?;
            output
                .add_image_page(page.page_size, &page.image)
                .map_err(|e| FlattenError::Embed {
                    page: index + 1,
                    detail: e.to_string(),
                })?;
            debug!(
                "Flattened page {} ({}x{} px)",
                index + 1,
                page.image.width(),
                page.image.height()
            );
            let done = index + 1;
            on_progress(percent_of(done, total), &format!("Flattening page {done} of {total}"));
        }

        output.save().map_err(|e| FlattenError::Save(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{raster_label, FakeEngine, FakePdf};
    use crate::error::{LoadError, RenderError};
    use crate::progress::ignore_progress;
    use std::cell::RefCell;

    #[test]
    fn output_preserves_page_count_order_and_size() {
        let engine = FakeEngine::new();
        let src = FakePdf::letter(2, "p").with_page(595.0, 842.0, "a4");
        let out = Flattener::new(&engine, 2.0)
            .flatten(&src.bytes(), None, &ignore_progress)
            .unwrap();
        let out = FakePdf::parse(&out);

        assert_eq!(out.pages.len(), 3);
        let expected: Vec<String> = src.labels().iter().map(|l| raster_label(l)).collect();
        assert_eq!(out.labels(), expected);
        assert_eq!((out.pages[2].width, out.pages[2].height), (595.0, 842.0));
        assert_eq!(out.pages[0].raster, Some((1224, 1584)));
        assert_eq!(out.pages[2].raster, Some((1190, 1684)));
    }

    #[test]
    fn output_is_unencrypted() {
        let engine = FakeEngine::new();
        let src = FakePdf::letter(1, "p").with_user_password("hunter2");
        let out = Flattener::new(&engine, 1.0)
            .flatten(&src.bytes(), Some("hunter2"), &ignore_progress)
            .unwrap();
        let reopened = engine.open(&out, None).unwrap();
        assert!(!reopened.is_encrypted());
    }

    #[test]
    fn empty_password_documents_flatten_without_a_password() {
        let engine = FakeEngine::new();
        let src = FakePdf::letter(1, "p").with_user_password("");
        assert!(Flattener::new(&engine, 1.0)
            .flatten(&src.bytes(), None, &ignore_progress)
            .is_ok());
    }

    #[test]
    fn progress_is_reported_per_page() {
        let engine = FakeEngine::new();
        let seen = RefCell::new(Vec::new());
        let record = |pct: u8, msg: &str| seen.borrow_mut().push((pct, msg.to_string()));
        Flattener::new(&engine, 1.0)
            .flatten(&FakePdf::letter(3, "p").bytes(), None, &record)
            .unwrap();
        assert_eq!(
            seen.into_inner(),
            vec![
                (33, "Flattening page 1 of 3".to_string()),
                (67, "Flattening page 2 of 3".to_string()),
                (100, "Flattening page 3 of 3".to_string()),
            ]
        );
    }

    #[test]
    fn zero_pages_is_an_error() {
        let engine = FakeEngine::new();
        let err = Flattener::new(&engine, 1.0)
            .flatten(&FakePdf::default().bytes(), None, &ignore_progress)
            .unwrap_err();
        assert_eq!(err, FlattenError::EmptyDocument);
    }

    #[test]
    fn wrong_password_fails_to_load() {
        let engine = FakeEngine::new();
        let src = FakePdf::letter(1, "p").with_user_password("right");
        let err = Flattener::new(&engine, 1.0)
            .flatten(&src.bytes(), Some("wrong"), &ignore_progress)
            .unwrap_err();
        assert_eq!(err, FlattenError::Load(LoadError::WrongPassword));
    }

    #[test]
    fn render_failure_aborts_the_whole_document() {
        let engine = FakeEngine::new();
        let src = FakePdf::letter(3, "p").break_page(1);
        let err = Flattener::new(&engine, 1.0)
            .flatten(&src.bytes(), None, &ignore_progress)
            .unwrap_err();
        assert!(matches!(err, FlattenError::Render(RenderError::Failed { page: 2, .. })));
    }

    #[test]
    fn embed_failure_is_reported_with_page() {
        let engine = FakeEngine::new().failing_embed_after(1);
        let err = Flattener::new(&engine, 1.0)
            .flatten(&FakePdf::letter(2, "p").bytes(), None, &ignore_progress)
            .unwrap_err();
        assert!(matches!(err, FlattenError::Embed { page: 2, .. }));
    }

    #[test]
    fn cancellation_stops_before_the_next_page() {
        let engine = FakeEngine::new();
        let flag = CancelFlag::new();
        let trip = flag.clone();
        let cancel_after_first = move |pct: u8, _: &str| {
            if pct > 0 {
                trip.cancel();
            }
        };
        let err = Flattener::new(&engine, 1.0)
            .cancel_flag(flag)
            .flatten(&FakePdf::letter(4, "p").bytes(), None, &cancel_after_first)
            .unwrap_err();
        assert_eq!(err, FlattenError::Cancelled { completed: 1, total: 4 });
    }
}
