//! Merge: build one document from an ordered list of page references.
//!
//! Every reference is validated before the output document is created, so a
//! stale reference fails the merge without doing any copying.

use crate::engine::{OutputDocument, PdfEngine, SourceDocument};
use crate::error::AssemblyError;
use crate::pipeline::loader;
use crate::progress::{percent_of, ProgressFn};
use crate::workspace::{PageReference, WorkspaceSnapshot};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Copy `ordered` pages, in order, from the opened `sources` into a new
/// document.
pub fn assemble<'a, E: PdfEngine>(
    engine: &'a E,
    ordered: &[PageReference],
    sources: &HashMap<usize, E::Document<'a>>,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<u8>, AssemblyError> {
    if ordered.is_empty() {
        return Err(AssemblyError::NoPages);
    }
    for page in ordered {
        let source = sources
            .get(&page.file_index)
            .ok_or_else(|| AssemblyError::MissingSource {
                page_id: page.id.clone(),
                file_index: page.file_index,
            })?;
        let total = source.page_count();
        if page.page_index >= total {
            return Err(AssemblyError::PageOutOfRange {
                page_id: page.id.clone(),
                file_index: page.file_index,
                page_index: page.page_index,
                total,
            });
        }
    }

    let total = ordered.len();
    let mut output = engine.create()?;
    for (i, page) in ordered.iter().enumerate() {
        if let Some(source) = sources.get(&page.file_index) {
            engine.copy_page(&mut output, source, page.page_index)?;
        }
        let done = i + 1;
        on_progress(percent_of(done, total), &format!("Copying page {done} of {total}"));
    }
    info!("Assembled {} pages from {} files", output.page_count(), sources.len());
    Ok(output.save()?)
}

/// Merge the snapshot's page grid, in grid order, into one document.
///
/// Only files that still have pages on the grid are opened.
pub fn merge<E: PdfEngine>(
    engine: &E,
    snapshot: &WorkspaceSnapshot,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<u8>, AssemblyError> {
    if snapshot.pages.is_empty() {
        return Err(AssemblyError::NoPages);
    }
    let referenced: BTreeSet<usize> = snapshot.pages.iter().map(|p| p.file_index).collect();
    let mut sources = HashMap::with_capacity(referenced.len());
    for file_index in referenced {
        let Some(file) = snapshot.files.get(file_index) else {
            // Left out of `sources`; assemble reports the dangling page.
            continue;
        };
        let loaded = loader::load(engine, &file.bytes, None).map_err(|source| AssemblyError::Load {
            file_index,
            name: file.name.clone(),
            source,
        })?;
        sources.insert(file_index, loaded.document);
    }
    assemble(engine, &snapshot.pages, &sources, on_progress)
}
