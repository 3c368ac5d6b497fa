//! Whole-file entry points.
//!
//! Each async function reads its input, then binds PDFium and does all PDF
//! work inside `spawn_blocking`. The engine-generic `*_source` functions
//! underneath take an already-bound engine and a [`ProgressTracker`], so
//! hosts that keep their own engine (and tests) can call them directly.
//!
//! Use [`crate::stream::flatten_stream`] instead of [`flatten_file`] to
//! receive progress as a stream.

use crate::config::UnlockConfig;
use crate::engine::pdfium::PdfiumEngine;
use crate::engine::PdfEngine;
use crate::error::UnlockError;
use crate::intake::{IntakeCoordinator, IntakeOutcome, IntakeReport};
use crate::output::{write_output, UnlockMethod, UnlockOutput};
use crate::pipeline::assemble::merge;
use crate::pipeline::flatten::Flattener;
use crate::pipeline::input::load_source_file;
use crate::pipeline::loader::{self, describe, DocumentInfo};
use crate::pipeline::render::Rasterizer;
use crate::pipeline::split::{export_page_images, split, SplitMode, SplitPart};
use crate::pipeline::thumbnail::generate_thumbnails;
use crate::progress::{Operation, ProgressTracker};
use crate::workspace::{SourceFile, Workspace};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Run intake over `files`, answering every password prompt with
/// `config.password`.
///
/// A prompt that cannot be answered (no password, or the password already
/// failed for that file) skips the file.
pub fn intake_batch<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    workspace: &mut Workspace,
    files: Vec<SourceFile>,
    config: &UnlockConfig,
) -> Result<IntakeReport, UnlockError> {
    let mut coordinator = IntakeCoordinator::new(engine, tracker, config.clone());
    let mut outcome = coordinator.ingest(workspace, files)?;
    loop {
        match outcome {
            IntakeOutcome::Completed(report) => return Ok(report),
            IntakeOutcome::AwaitingPassword(attempt) => {
                outcome = match (&config.password, &attempt.password_guess) {
                    (Some(password), None) => {
                        info!("'{}' needs a password; using the supplied one", attempt.file_name);
                        coordinator.submit_password(workspace, password, config.force_unlock)?
                    }
                    _ => {
                        warn!("Skipping '{}': no working password", attempt.file_name);
                        coordinator.cancel(workspace)?
                    }
                };
            }
        }
    }
}

/// Unlock one file: pass it through, decrypt it or flatten it.
pub fn unlock_source<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    file: SourceFile,
    config: &UnlockConfig,
) -> Result<UnlockOutput, UnlockError> {
    let start = Instant::now();
    let name = file.name.clone();
    let mut workspace = Workspace::new();
    let report = intake_batch(engine, tracker, &mut workspace, vec![file], config)?;

    let Some(committed) = report.committed.into_iter().next() else {
        let reason = report
            .skipped
            .into_iter()
            .next()
            .map(|s| s.reason)
            .unwrap_or_else(|| "no output produced".to_string());
        return Err(UnlockError::Rejected { name, reason });
    };
    let bytes = workspace.remove_file(committed.file_index)?.bytes;
    Ok(UnlockOutput {
        file_name: name,
        bytes,
        page_count: committed.page_count,
        method: committed.method,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Flatten one file regardless of its protection.
pub fn flatten_source<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    file: SourceFile,
    config: &UnlockConfig,
) -> Result<UnlockOutput, UnlockError> {
    let start = Instant::now();
    let op = tracker.begin(Operation::Flatten)?;
    let progress = |pct: u8, msg: &str| op.report(pct, msg);
    let flattened = Flattener::new(engine, config.scale_for(config.force_unlock))
        .max_rendered_pixels(config.max_rendered_pixels)
        .flatten(&file.bytes, config.password.as_deref(), &progress);
    let bytes = match flattened {
        Ok(bytes) => bytes,
        Err(source) => {
            op.fail(&source.to_string());
            return Err(UnlockError::Flatten {
                name: file.name,
                source,
            });
        }
    };
    let page_count = match loader::load(engine, &bytes, None) {
        Ok(doc) => doc.page_count(),
        Err(source) => {
            op.fail(&source.to_string());
            return Err(UnlockError::Load {
                name: file.name,
                source,
            });
        }
    };
    op.complete();
    Ok(UnlockOutput {
        file_name: file.name,
        bytes,
        page_count,
        method: UnlockMethod::Flattened,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Flatten file `file_index` of `workspace` in place.
///
/// For files committed as-is that the operator wants rasterised after all.
/// The file keeps its index, and its new pages take the grid position of
/// the old ones.
pub fn flatten_in_workspace<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    workspace: &mut Workspace,
    file_index: usize,
    config: &UnlockConfig,
) -> Result<(), UnlockError> {
    let file = workspace
        .files()
        .get(file_index)
        .ok_or(UnlockError::FileIndexOutOfRange {
            index: file_index,
            len: workspace.files().len(),
        })?;
    let op = tracker.begin(Operation::Flatten)?;
    let progress = |pct: u8, msg: &str| op.report(pct, msg);

    let flattened = Flattener::new(engine, config.scale_for(config.force_unlock))
        .max_rendered_pixels(config.max_rendered_pixels)
        .flatten(&file.bytes, config.password.as_deref(), &progress)
        .map(|bytes| file.with_bytes(bytes))
        .map_err(|source| UnlockError::Flatten {
            name: file.name.clone(),
            source,
        });
    let replaced = flattened.and_then(|flattened| {
        let pages = generate_thumbnails(
            engine,
            &flattened,
            file_index,
            None,
            Rasterizer::new(config.max_rendered_pixels),
            config.thumbnail_scale,
            &progress,
        )
        .map_err(|source| UnlockError::Thumbnail {
            name: flattened.name.clone(),
            source,
        })?;
        info!("Flattened '{}' in place ({} pages)", flattened.name, pages.len());
        workspace.replace_file(file_index, flattened, pages)
    });

    match replaced {
        Ok(()) => {
            op.complete();
            Ok(())
        }
        Err(e) => {
            op.fail(&e.to_string());
            Err(e)
        }
    }
}

/// Unlock every file and merge all their pages, in input order.
pub fn merge_sources<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    files: Vec<SourceFile>,
    config: &UnlockConfig,
) -> Result<(Vec<u8>, IntakeReport), UnlockError> {
    let mut workspace = Workspace::new();
    let report = intake_batch(engine, tracker, &mut workspace, files, config)?;
    let op = tracker.begin(Operation::Merge)?;
    let progress = |pct: u8, msg: &str| op.report(pct, msg);
    match merge(engine, &workspace.snapshot(), &progress) {
        Ok(bytes) => {
            op.complete();
            Ok((bytes, report))
        }
        Err(e) => {
            op.fail(&e.to_string());
            Err(e.into())
        }
    }
}

fn stem(file: &SourceFile) -> String {
    Path::new(&file.name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

pub fn split_source<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    file: &SourceFile,
    mode: &SplitMode,
    config: &UnlockConfig,
) -> Result<Vec<SplitPart>, UnlockError> {
    let op = tracker.begin(Operation::Split)?;
    let progress = |pct: u8, msg: &str| op.report(pct, msg);
    match split(engine, &file.bytes, config.password.as_deref(), mode, &stem(file), &progress) {
        Ok(parts) => {
            op.complete();
            Ok(parts)
        }
        Err(e) => {
            op.fail(&e.to_string());
            Err(e.into())
        }
    }
}

pub fn export_source_images<E: PdfEngine>(
    engine: &E,
    tracker: &ProgressTracker,
    file: &SourceFile,
    scale: f32,
    config: &UnlockConfig,
) -> Result<Vec<SplitPart>, UnlockError> {
    let op = tracker.begin(Operation::ExportImages)?;
    let progress = |pct: u8, msg: &str| op.report(pct, msg);
    match export_page_images(
        engine,
        &file.bytes,
        config.password.as_deref(),
        Rasterizer::new(config.max_rendered_pixels),
        scale,
        &stem(file),
        &progress,
    ) {
        Ok(parts) => {
            op.complete();
            Ok(parts)
        }
        Err(e) => {
            op.fail(&e.to_string());
            Err(e.into())
        }
    }
}

pub fn inspect_source<E: PdfEngine>(
    engine: &E,
    file: &SourceFile,
    password: Option<&str>,
) -> Result<DocumentInfo, UnlockError> {
    let loaded = loader::load(engine, &file.bytes, password).map_err(|source| UnlockError::Load {
        name: file.name.clone(),
        source,
    })?;
    Ok(describe(&loaded))
}

/// Bind PDFium on a blocking worker and run `f` against it.
async fn with_pdfium<T, F>(f: F) -> Result<T, UnlockError>
where
    F: FnOnce(&PdfiumEngine) -> Result<T, UnlockError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let engine = PdfiumEngine::bind()?;
        f(&engine)
    })
    .await
    .map_err(|e| UnlockError::Internal(format!("PDF worker panicked: {e}")))?
}

/// Page count, page sizes and protection of a PDF.
pub async fn inspect(input: impl AsRef<Path>, password: Option<&str>) -> Result<DocumentInfo, UnlockError> {
    let file = load_source_file(input.as_ref()).await?;
    let password = password.map(str::to_string);
    with_pdfium(move |engine| inspect_source(engine, &file, password.as_deref())).await
}

/// Unlock a PDF file.
///
/// # Example
/// ```rust,no_run
/// use pdfunlock::{unlock, UnlockConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = UnlockConfig::builder().password("hunter2").build()?;
///     let output = unlock("statement.pdf", &config).await?;
///     std::fs::write("statement-unlocked.pdf", &output.bytes)?;
///     println!("{} pages via {:?}", output.page_count, output.method);
///     Ok(())
/// }
/// ```
pub async fn unlock(input: impl AsRef<Path>, config: &UnlockConfig) -> Result<UnlockOutput, UnlockError> {
    let file = load_source_file(input.as_ref()).await?;
    info!("Unlocking {}", file.name);
    let config = config.clone();
    with_pdfium(move |engine| {
        let tracker = ProgressTracker::new(config.progress_callback.clone());
        unlock_source(engine, &tracker, file, &config)
    })
    .await
}

/// Unlock `input` and write the result atomically to `output_path`.
pub async fn unlock_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &UnlockConfig,
) -> Result<UnlockOutput, UnlockError> {
    let output = unlock(input, config).await?;
    write_output(output_path.as_ref(), output.bytes.clone()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`unlock`].
///
/// Creates a temporary tokio runtime internally.
pub fn unlock_sync(input: impl AsRef<Path>, config: &UnlockConfig) -> Result<UnlockOutput, UnlockError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| UnlockError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(unlock(input, config))
}

/// Flatten a PDF file to page images, protected or not.
pub async fn flatten_file(input: impl AsRef<Path>, config: &UnlockConfig) -> Result<UnlockOutput, UnlockError> {
    let file = load_source_file(input.as_ref()).await?;
    let config = config.clone();
    with_pdfium(move |engine| {
        let tracker = ProgressTracker::new(config.progress_callback.clone());
        flatten_source(engine, &tracker, file, &config)
    })
    .await
}

/// Flatten `input` and write the result atomically to `output_path`.
pub async fn flatten_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &UnlockConfig,
) -> Result<UnlockOutput, UnlockError> {
    let output = flatten_file(input, config).await?;
    write_output(output_path.as_ref(), output.bytes.clone()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`flatten_file`].
pub fn flatten_sync(input: impl AsRef<Path>, config: &UnlockConfig) -> Result<UnlockOutput, UnlockError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| UnlockError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(flatten_file(input, config))
}

/// Unlock and merge `inputs` into one document.
pub async fn merge_files(
    inputs: &[PathBuf],
    config: &UnlockConfig,
) -> Result<(Vec<u8>, IntakeReport), UnlockError> {
    let mut files = Vec::with_capacity(inputs.len());
    for path in inputs {
        files.push(load_source_file(path).await?);
    }
    let config = config.clone();
    with_pdfium(move |engine| {
        let tracker = ProgressTracker::new(config.progress_callback.clone());
        merge_sources(engine, &tracker, files, &config)
    })
    .await
}

pub async fn split_file(
    input: impl AsRef<Path>,
    mode: SplitMode,
    config: &UnlockConfig,
) -> Result<Vec<SplitPart>, UnlockError> {
    let file = load_source_file(input.as_ref()).await?;
    let config = config.clone();
    with_pdfium(move |engine| {
        let tracker = ProgressTracker::new(config.progress_callback.clone());
        split_source(engine, &tracker, &file, &mode, &config)
    })
    .await
}

pub async fn export_images(
    input: impl AsRef<Path>,
    scale: f32,
    config: &UnlockConfig,
) -> Result<Vec<SplitPart>, UnlockError> {
    let file = load_source_file(input.as_ref()).await?;
    let config = config.clone();
    with_pdfium(move |engine| {
        let tracker = ProgressTracker::new(config.progress_callback.clone());
        export_source_images(engine, &tracker, &file, scale, &config)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{raster_label, FakeEngine, FakePdf};
    use crate::error::LoadError;

    fn file(name: &str, pdf: FakePdf) -> SourceFile {
        SourceFile::new(name, pdf.bytes())
    }

    #[test]
    fn unlock_uses_configured_password() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let config = UnlockConfig::builder().password("pw").build().unwrap();
        let src = FakePdf::letter(2, "p").with_user_password("pw");
        let out = unlock_source(&engine, &tracker, file("a.pdf", src.clone()), &config).unwrap();
        assert_eq!(out.method, UnlockMethod::Decrypted);
        assert_eq!(out.page_count, 2);
        assert_eq!(FakePdf::parse(&out.bytes).labels(), src.labels());
        assert!(tracker.is_idle());
    }

    #[test]
    fn unlock_without_password_is_rejected() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let src = FakePdf::letter(1, "p").with_user_password("pw");
        let err = unlock_source(&engine, &tracker, file("a.pdf", src), &UnlockConfig::default()).unwrap_err();
        assert!(matches!(err, UnlockError::Rejected { ref name, .. } if name == "a.pdf"));
        assert!(tracker.is_idle());
    }

    #[test]
    fn wrong_configured_password_is_rejected_with_reason() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let config = UnlockConfig::builder().password("nope").build().unwrap();
        let src = FakePdf::letter(1, "p").with_user_password("pw");
        let err = unlock_source(&engine, &tracker, file("a.pdf", src), &config).unwrap_err();
        assert!(err.to_string().contains("wrong password"), "got: {err}");
    }

    #[test]
    fn flatten_source_always_rasterises() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let out = flatten_source(&engine, &tracker, file("a.pdf", FakePdf::letter(2, "p")), &UnlockConfig::default())
            .unwrap();
        assert_eq!(out.method, UnlockMethod::Flattened);
        assert_eq!(out.page_count, 2);
        assert_eq!(FakePdf::parse(&out.bytes).pages[0].raster, Some((1224, 1584)));
    }

    #[test]
    fn unreadable_flatten_output_is_an_error() {
        let engine = FakeEngine::new().saving_garbage();
        let tracker = ProgressTracker::default();
        let err = flatten_source(&engine, &tracker, file("a.pdf", FakePdf::letter(1, "p")), &UnlockConfig::default())
            .unwrap_err();
        assert!(matches!(err, UnlockError::Load { ref name, source: LoadError::Corrupt(_) } if name == "a.pdf"));
        assert!(tracker.is_idle());
    }

    #[test]
    fn flatten_in_workspace_keeps_index_and_grid_position() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let mut ws = Workspace::new();
        intake_batch(
            &engine,
            &tracker,
            &mut ws,
            vec![file("a.pdf", FakePdf::letter(2, "a")), file("b.pdf", FakePdf::letter(1, "b"))],
            &UnlockConfig::default(),
        )
        .unwrap();
        ws.move_page(2, 0).unwrap();

        flatten_in_workspace(&engine, &tracker, &mut ws, 0, &UnlockConfig::default()).unwrap();

        let names: Vec<&str> = ws.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.pdf", "b.pdf"]);
        let stored = FakePdf::parse(&ws.files()[0].bytes);
        assert_eq!(stored.labels(), [raster_label("a1"), raster_label("a2")]);
        let grid: Vec<(usize, usize)> = ws.pages().iter().map(|p| (p.file_index, p.page_index)).collect();
        assert_eq!(grid, [(1, 0), (0, 0), (0, 1)]);
        assert!(tracker.is_idle());
    }

    #[test]
    fn flatten_in_workspace_rejects_unknown_file() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let mut ws = Workspace::new();
        let err = flatten_in_workspace(&engine, &tracker, &mut ws, 3, &UnlockConfig::default()).unwrap_err();
        assert!(matches!(err, UnlockError::FileIndexOutOfRange { index: 3, len: 0 }));
        assert!(tracker.is_idle());
    }

    #[test]
    fn merge_concatenates_in_input_order() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let (bytes, report) = merge_sources(
            &engine,
            &tracker,
            vec![
                file("a.pdf", FakePdf::letter(2, "a")),
                file("b.pdf", FakePdf::letter(1, "b").with_user_password("")),
            ],
            &UnlockConfig::default(),
        )
        .unwrap();
        assert_eq!(report.committed.len(), 2);
        assert_eq!(FakePdf::parse(&bytes).labels(), ["a1".to_string(), "a2".to_string(), raster_label("b1")]);
        assert!(tracker.is_idle());
    }

    #[test]
    fn reordered_grid_drives_merge_output() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let mut ws = Workspace::new();
        intake_batch(
            &engine,
            &tracker,
            &mut ws,
            vec![file("a.pdf", FakePdf::letter(3, "a")), file("b.pdf", FakePdf::letter(2, "b"))],
            &UnlockConfig::default(),
        )
        .unwrap();

        ws.move_page(2, 0).unwrap();
        let bytes = merge(&engine, &ws.snapshot(), &crate::progress::ignore_progress).unwrap();

        let labels = FakePdf::parse(&bytes).labels();
        assert_eq!(labels, ["a3", "a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn merge_of_only_skipped_files_has_no_pages() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let err = merge_sources(
            &engine,
            &tracker,
            vec![SourceFile::new("bad.pdf", b"%PDF-?".to_vec())],
            &UnlockConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UnlockError::Assembly(crate::error::AssemblyError::NoPages)));
        assert!(tracker.is_idle());
    }

    #[test]
    fn split_names_parts_after_the_file() {
        let engine = FakeEngine::new();
        let tracker = ProgressTracker::default();
        let parts = split_source(
            &engine,
            &tracker,
            &file("report.pdf", FakePdf::letter(2, "p")),
            &SplitMode::EveryPage,
            &UnlockConfig::default(),
        )
        .unwrap();
        assert_eq!(parts[1].name, "report-page-2.pdf");
    }

    #[test]
    fn inspect_reports_protection() {
        let engine = FakeEngine::new();
        let info = inspect_source(&engine, &file("a.pdf", FakePdf::letter(1, "p").with_user_password("")), None).unwrap();
        assert!(info.encrypted);
        assert_eq!(info.page_count, 1);
        let err = inspect_source(&engine, &file("a.pdf", FakePdf::letter(1, "p").with_user_password("x")), None)
            .unwrap_err();
        assert!(matches!(err, UnlockError::Load { .. }));
    }
}
