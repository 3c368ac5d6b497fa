//! Thumbnail generation: one [`PageReference`] per page of a committed file.

use crate::engine::{PdfEngine, SourceDocument};
use crate::error::{LoadError, ThumbnailError};
use crate::pipeline::encode::encode_thumbnail;
use crate::pipeline::loader::open_once;
use crate::pipeline::render::Rasterizer;
use crate::progress::{percent_of, ProgressFn};
use crate::workspace::{PageReference, SourceFile};
use tracing::debug;
use uuid::Uuid;

/// Fresh page id: `p{page}-{uuid}`.
pub fn new_page_id(page_index: usize) -> String {
    format!("p{}-{}", page_index, Uuid::new_v4().simple())
}

/// Render every page of `file` at `scale` and build its page references.
///
/// Without a password, a password failure is retried once with `""`.
pub fn generate_thumbnails<E: PdfEngine>(
    engine: &E,
    file: &SourceFile,
    file_index: usize,
    password: Option<&str>,
    rasterizer: Rasterizer,
    scale: f32,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<PageReference>, ThumbnailError> {
    let document = match open_once(engine, &file.bytes, password) {
        Err(LoadError::Encrypted) if password.is_none() => {
            debug!("'{}' needs a password for thumbnails; trying empty", file.name);
            open_once(engine, &file.bytes, Some(""))?
        }
        other => other?,
    };

    let total = document.page_count();
    let mut pages = Vec::with_capacity(total);
    for page_index in 0..total {
        let rendered = rasterizer.render(&document, page_index, scale)?;
        let thumbnail = encode_thumbnail(&rendered.image).map_err(|e| ThumbnailError::Encode {
            page: page_index + 1,
            detail: e.to_string(),
        })?;
        pages.push(PageReference {
            id: new_page_id(page_index),
            file_index,
            page_index,
            file_name: file.name.clone(),
            thumbnail,
        });
        let done = page_index + 1;
        on_progress(
            percent_of(done, total),
            &format!("Generating thumbnail {done} of {total} for {}", file.name),
        );
    }
    Ok(pages)
}
