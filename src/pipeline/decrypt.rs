//! Lossless unlock: copy every page of a password-opened document into a new,
//! unencrypted one.
//!
//! Text, vectors and form fields survive. Engines that cannot copy pages out
//! of a particular security handler fail here, and the caller falls back to
//! flattening.

use crate::engine::{OutputDocument, PdfEngine, SourceDocument};
use crate::error::AssemblyError;
use crate::pipeline::loader;
use crate::progress::{percent_of, ProgressFn};
use tracing::info;

pub fn decrypt<E: PdfEngine>(
    engine: &E,
    bytes: &[u8],
    password: Option<&str>,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<u8>, AssemblyError> {
    let source = match password {
        Some(p) => loader::open_once(engine, bytes, Some(p))?,
        None => loader::load(engine, bytes, None)?.document,
    };
    let total = source.page_count();
    if total == 0 {
        return Err(AssemblyError::NoPages);
    }
    info!("Decrypting {} pages", total);

    let mut output = engine.create()?;
    for index in 0..total {
        engine.copy_page(&mut output, &source, index)?;
        let done = index + 1;
        on_progress(percent_of(done, total), &format!("Copying page {done} of {total}"));
    }
    Ok(output.save()?)
}
