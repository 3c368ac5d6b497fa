//! End-to-end integration tests for pdfunlock.
//!
//! These tests drive the real PDFium engine. Fixture PDFs are generated on
//! the fly; the password-protected cases additionally use files from
//! `./test_cases/` (`owner_protected.pdf`, `user_password.pdf`) when
//! present. They are gated behind the `E2E_ENABLED`
//! environment variable because PDFium is downloaded on first use.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_merge -- --nocapture

use futures::StreamExt;
use image::{DynamicImage, Rgb, RgbImage};
use pdfunlock::{
    export_images, flatten_file, flatten_stream, inspect, merge_files, split_file, unlock,
    unlock_to_file, FlattenEvent, OutputDocument, PageSelection, PageSize, PdfEngine, PdfiumEngine,
    SourceDocument, SplitMode, UnlockConfig, UnlockError, UnlockMethod,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        e2e_skip_unless_enabled!();
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Page fill colours used to tell generated pages apart after reordering.
const COLOURS: [[u8; 3]; 4] = [[220, 40, 40], [40, 180, 60], [40, 80, 220], [230, 200, 30]];

/// Write a PDF whose page `i` is a solid fill of `colours[i]`.
fn write_pdf(dir: &Path, name: &str, colours: &[[u8; 3]]) -> PathBuf {
    let engine = PdfiumEngine::bind().expect("pdfium should bind");
    let mut doc = engine.create().expect("create document");
    for c in colours {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(306, 396, Rgb(*c)));
        doc.add_image_page(PageSize::new(612.0, 792.0), &image)
            .expect("add page");
    }
    let path = dir.join(name);
    std::fs::write(&path, doc.save().expect("save")).expect("write fixture");
    path
}

/// Render page `index` of `bytes` and sample the centre pixel.
fn centre_colour(bytes: &[u8], index: usize) -> [u8; 3] {
    let engine = PdfiumEngine::bind().expect("pdfium should bind");
    let doc = engine.open(bytes, None).expect("open output");
    let image = doc.render_page(index, 60, 80).expect("render").to_rgb8();
    image.get_pixel(30, 40).0
}

fn assert_close(actual: [u8; 3], expected: [u8; 3], context: &str) {
    let close = actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| (*a as i16 - *e as i16).abs() <= 12);
    assert!(close, "[{context}] expected ≈{expected:?}, got {actual:?}");
}

fn config() -> UnlockConfig {
    UnlockConfig::builder()
        .flatten_scale(1.0)
        .force_flatten_scale(1.0)
        .thumbnail_scale(0.1)
        .build()
        .unwrap()
}

// ── Inspect ──────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_generated_pdf() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "three.pdf", &COLOURS[..3]);

    let info = inspect(&path, None).await.expect("inspect() should succeed");

    assert_eq!(info.page_count, 3);
    assert!(!info.encrypted);
    assert_eq!(info.page_sizes.len(), 3);
    assert!((info.page_sizes[0].width - 612.0).abs() < 1.0);
    println!("Info: {info:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_rejects_non_pdf() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, b"plain text, not a PDF").unwrap();

    let err = inspect(&path, None).await.unwrap_err();
    assert!(matches!(err, UnlockError::NotAPdf { .. }), "got: {err}");
}

// ── Unlock ───────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_unlock_unprotected_passes_through() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "plain.pdf", &COLOURS[..2]);
    let original = std::fs::read(&path).unwrap();

    let output = unlock(&path, &config()).await.expect("unlock() should succeed");

    assert_eq!(output.method, UnlockMethod::PassThrough);
    assert_eq!(output.page_count, 2);
    assert_eq!(output.bytes, original, "unprotected files are kept byte-for-byte");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unlock_to_file_writes_output() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "plain.pdf", &COLOURS[..1]);
    let out = dir.path().join("out/unlocked.pdf");
    std::fs::create_dir_all(out.parent().unwrap()).unwrap();

    let output = unlock_to_file(&path, &out, &config()).await.unwrap();

    assert_eq!(std::fs::read(&out).unwrap(), output.bytes);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unlock_owner_protected_copies_pages() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("owner_protected.pdf"));

    let output = unlock(&path, &config()).await.expect("owner-only files unlock silently");

    assert_eq!(output.method, UnlockMethod::Decrypted);
    assert!(!is_encrypted(&output.bytes), "unlocked output must not be encrypted");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unlock_user_password_without_password_is_rejected() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("user_password.pdf"));

    let err = unlock(&path, &config()).await.unwrap_err();
    assert!(matches!(err, UnlockError::Rejected { .. }), "got: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unlock_user_password_with_password() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("user_password.pdf"));
    // test_cases/user_password.pdf is encrypted with user password "test".
    let config = UnlockConfig::builder().password("test").build().unwrap();

    let output = unlock(&path, &config).await.expect("correct password unlocks");

    assert_eq!(output.method, UnlockMethod::Decrypted);
    assert!(!is_encrypted(&output.bytes));
}

fn is_encrypted(bytes: &[u8]) -> bool {
    let engine = PdfiumEngine::bind().expect("pdfium should bind");
    let encrypted = engine.open(bytes, None).expect("open output").is_encrypted();
    encrypted
}

// ── Flatten ──────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_flatten_keeps_page_order_and_size() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "colours.pdf", &COLOURS[..3]);

    let output = flatten_file(&path, &config()).await.expect("flatten should succeed");

    assert_eq!(output.method, UnlockMethod::Flattened);
    assert_eq!(output.page_count, 3);
    for (i, c) in COLOURS[..3].iter().enumerate() {
        assert_close(centre_colour(&output.bytes, i), *c, &format!("page {}", i + 1));
    }
    let engine = PdfiumEngine::bind().unwrap();
    let size = engine.open(&output.bytes, None).unwrap().page_size(0).unwrap();
    assert!((size.width - 612.0).abs() < 1.0 && (size.height - 792.0).abs() < 1.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_flatten_stream_reports_every_page() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "stream.pdf", &COLOURS);

    let mut stream = flatten_stream(&path, &config()).await.unwrap();
    let mut progress = Vec::new();
    let mut finished = None;
    while let Some(event) = stream.next().await {
        match event {
            FlattenEvent::Progress(p) => progress.push(p.percent),
            FlattenEvent::Finished(output) => finished = Some(output),
            FlattenEvent::Failed(e) => panic!("flatten failed: {e}"),
        }
    }

    let output = finished.expect("stream must end with Finished");
    assert_eq!(output.page_count, 4);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "progress must not go backwards");
    assert_eq!(progress.last(), Some(&100));
}

// ── Merge / split ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_concatenates_in_input_order() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", &COLOURS[..2]);
    let b = write_pdf(dir.path(), "b.pdf", &COLOURS[2..]);

    let (merged, report) = merge_files(&[b, a], &config()).await.expect("merge should succeed");

    assert_eq!(report.committed.len(), 2);
    assert!(report.skipped.is_empty());
    assert_close(centre_colour(&merged, 0), COLOURS[2], "merged page 1");
    assert_close(centre_colour(&merged, 3), COLOURS[1], "merged page 4");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_split_every_page() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "report.pdf", &COLOURS[..3]);

    let parts = split_file(&path, SplitMode::EveryPage, &config()).await.unwrap();

    let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["report-page-1.pdf", "report-page-2.pdf", "report-page-3.pdf"]);
    assert_close(centre_colour(&parts[1].bytes, 0), COLOURS[1], "part 2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_split_extract_selection() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "report.pdf", &COLOURS);

    let parts = split_file(&path, SplitMode::Extract(PageSelection::Set(vec![4, 2])), &config())
        .await
        .unwrap();

    assert_eq!(parts.len(), 1);
    assert_close(centre_colour(&parts[0].bytes, 0), COLOURS[1], "first extracted");
    assert_close(centre_colour(&parts[0].bytes, 1), COLOURS[3], "second extracted");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_images_as_png() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(dir.path(), "scan.pdf", &COLOURS[..2]);

    let parts = export_images(&path, 0.5, &config()).await.unwrap();

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "scan-page-1.png");
    let png = image::load_from_memory(&parts[0].bytes).expect("valid PNG");
    assert_eq!((png.width(), png.height()), (306, 396));
}
