//! Split and page-image export, plus ZIP packaging of the parts.

use crate::config::PageSelection;
use crate::engine::{OutputDocument, PdfEngine, SourceDocument};
use crate::error::{AssemblyError, EngineError};
use crate::pipeline::encode::encode_png;
use crate::pipeline::loader;
use crate::pipeline::render::Rasterizer;
use crate::progress::{percent_of, ProgressFn};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// How to cut a document into parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    /// One part per page.
    EveryPage,
    /// One part per 1-based inclusive range, clipped to the document.
    Ranges(Vec<(usize, usize)>),
    /// A single part holding the selected pages.
    Extract(PageSelection),
}

/// A named output file.
#[derive(Clone, PartialEq, Eq)]
pub struct SplitPart {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for SplitPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SplitPart({}, {} bytes)", self.name, self.bytes.len())
    }
}

fn part_name(base: &str, indices: &[usize]) -> String {
    match (indices.first(), indices.last()) {
        (Some(first), Some(last)) if first == last => format!("{base}-page-{}.pdf", first + 1),
        (Some(first), Some(last)) if last - first + 1 == indices.len() => {
            format!("{base}-pages-{}-{}.pdf", first + 1, last + 1)
        }
        _ => format!("{base}-selection.pdf"),
    }
}

fn groups(mode: &SplitMode, total: usize) -> Vec<Vec<usize>> {
    match mode {
        SplitMode::EveryPage => (0..total).map(|i| vec![i]).collect(),
        SplitMode::Ranges(ranges) => ranges
            .iter()
            .map(|&(start, end)| PageSelection::Range(start, end).to_indices(total))
            .filter(|g| !g.is_empty())
            .collect(),
        SplitMode::Extract(selection) => {
            let g = selection.to_indices(total);
            if g.is_empty() {
                vec![]
            } else {
                vec![g]
            }
        }
    }
}

/// Cut `bytes` into one new document per group of pages.
pub fn split<E: PdfEngine>(
    engine: &E,
    bytes: &[u8],
    password: Option<&str>,
    mode: &SplitMode,
    base_name: &str,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<SplitPart>, AssemblyError> {
    let source = loader::load(engine, bytes, password)?.document;
    let parts_wanted = groups(mode, source.page_count());
    if parts_wanted.is_empty() {
        return Err(AssemblyError::NoPages);
    }

    let count = parts_wanted.len();
    let mut parts = Vec::with_capacity(count);
    for (i, indices) in parts_wanted.iter().enumerate() {
        let mut output = engine.create()?;
        for &index in indices {
            engine.copy_page(&mut output, &source, index)?;
        }
        let name = part_name(base_name, indices);
        debug!("Split part {} has {} pages", name, output.page_count());
        parts.push(SplitPart {
            name,
            bytes: output.save()?,
        });
        let done = i + 1;
        on_progress(percent_of(done, count), &format!("Writing part {done} of {count}"));
    }
    info!("Split into {} parts", parts.len());
    Ok(parts)
}

/// Render each page of `bytes` to a PNG.
pub fn export_page_images<E: PdfEngine>(
    engine: &E,
    bytes: &[u8],
    password: Option<&str>,
    rasterizer: Rasterizer,
    scale: f32,
    base_name: &str,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<SplitPart>, AssemblyError> {
    let source = loader::load(engine, bytes, password)?.document;
    let total = source.page_count();
    if total == 0 {
        return Err(AssemblyError::NoPages);
    }
    let mut parts = Vec::with_capacity(total);
    for index in 0..total {
        let page = rasterizer.render(&source, index, scale)?;
        let png = encode_png(&page.image)
            .map_err(|e| EngineError(format!("encoding page {}: {e}", index + 1)))?;
        parts.push(SplitPart {
            name: format!("{base_name}-page-{}.png", index + 1),
            bytes: png,
        });
        let done = index + 1;
        on_progress(percent_of(done, total), &format!("Rendering page {done} of {total}"));
    }
    Ok(parts)
}

/// Package `parts` into a deflate-compressed ZIP archive.
pub fn write_zip(parts: &[SplitPart]) -> Result<Vec<u8>, AssemblyError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for part in parts {
        zip.start_file(part.name.as_str(), options)
            .map_err(|e| AssemblyError::Archive(e.to_string()))?;
        zip.write_all(&part.bytes)
            .map_err(|e| AssemblyError::Archive(e.to_string()))?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| AssemblyError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}
