//! # pdfium-locate
//!
//! Resolve a PDFium shared library for `pdfium-render` without asking the
//! user to install one by hand.
//!
//! Resolution order (first hit wins):
//!
//! 1. `PDFIUM_LIB_PATH` — an explicit path to `libpdfium.{so,dylib}` / `pdfium.dll`.
//! 2. The per-version cache directory (see [`cache_dir`]).
//! 3. A download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    unpacked into the cache directory. Skipped when
//!    [`LocateOptions::allow_download`] is `false`.
//! 4. The system library search path ([`Pdfium::bind_to_system_library`]),
//!    only from [`bind`].
//!
//! ```rust,no_run
//! use pdfium_locate::{bind, LocateOptions};
//!
//! let pdfium = bind(&LocateOptions::default()).expect("PDFium unavailable");
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// pdfium-binaries release tag (`chromium/<N>`) fetched on download.
pub const PDFIUM_VERSION: &str = "7690";

const RELEASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Env var pointing at an existing PDFium library.
pub const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Env var overriding the cache root.
pub const CACHE_DIR_ENV: &str = "PDFIUM_LOCATE_CACHE_DIR";

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("No PDFium build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cannot prepare cache directory '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDFium is not cached and downloading is disabled.\nSet PDFIUM_LIB_PATH=/path/to/libpdfium or allow the download.")]
    NotCached,

    #[error("Downloading PDFium failed: {0}")]
    Download(String),

    #[error("Unpacking PDFium archive failed: {0}")]
    Extract(String),

    #[error("Binding PDFium from '{path}' failed: {reason}")]
    Bind { path: PathBuf, reason: String },

    #[error("No PDFium library found on the system search path: {0}")]
    System(String),
}

/// Download progress: `(bytes_so_far, content_length)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

/// Knobs for [`locate`] and [`bind`].
#[derive(Clone, Copy)]
pub struct LocateOptions<'a> {
    /// Fetch the release archive when nothing is cached. Default: true.
    pub allow_download: bool,
    /// Called every read chunk while downloading.
    pub on_progress: Option<DownloadProgress<'a>>,
}

impl Default for LocateOptions<'_> {
    fn default() -> Self {
        Self {
            allow_download: true,
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for LocateOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocateOptions")
            .field("allow_download", &self.allow_download)
            .field("on_progress", &self.on_progress.map(|_| "<fn>"))
            .finish()
    }
}

/// Where a platform's library lives inside the release archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Platform {
    archive: &'static str,
    member: &'static str,
    file_name: &'static str,
}

impl Platform {
    fn current() -> Result<Self, LocateError> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn for_target(os: &str, arch: &str) -> Result<Self, LocateError> {
        let (archive, member, file_name) = match (os, arch) {
            ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
            _ => {
                return Err(LocateError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(Self {
            archive,
            member,
            file_name,
        })
    }

    fn url(&self) -> String {
        format!("{RELEASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", self.archive)
    }
}

/// Per-version cache directory.
///
/// `$PDFIUM_LOCATE_CACHE_DIR/pdfium-{VERSION}` when the override is set,
/// otherwise `<platform cache dir>/pdfunlock/pdfium-{VERSION}`.
pub fn cache_dir() -> PathBuf {
    let leaf = format!("pdfium-{PDFIUM_VERSION}");
    if let Some(root) = std::env::var_os(CACHE_DIR_ENV) {
        return PathBuf::from(root).join(leaf);
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pdfunlock")
        .join(leaf)
}

fn env_override() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os(LIB_PATH_ENV)?);
    if path.exists() {
        Some(path)
    } else {
        warn!(path = %path.display(), "PDFIUM_LIB_PATH does not exist; ignoring");
        None
    }
}

/// Path of an already-available library, without touching the network.
pub fn find_local() -> Option<PathBuf> {
    if let Some(path) = env_override() {
        return Some(path);
    }
    let platform = Platform::current().ok()?;
    let cached = cache_dir().join(platform.file_name);
    cached.exists().then_some(cached)
}

static LOCATED: OnceLock<PathBuf> = OnceLock::new();

/// Resolve the library path, downloading it into the cache when allowed.
///
/// The result is memoised for the life of the process.
pub fn locate(options: &LocateOptions<'_>) -> Result<PathBuf, LocateError> {
    if let Some(path) = LOCATED.get() {
        return Ok(path.clone());
    }

    let path = match find_local() {
        Some(path) => path,
        None if options.allow_download => download_into_cache(options.on_progress)?,
        None => return Err(LocateError::NotCached),
    };

    debug!(path = %path.display(), "PDFium library located");
    Ok(LOCATED.get_or_init(|| path).clone())
}

/// Bind `pdfium-render` to the located library, falling back to the system
/// search path when nothing could be located.
pub fn bind(options: &LocateOptions<'_>) -> Result<Pdfium, LocateError> {
    match locate(options) {
        Ok(path) => bind_path(&path),
        Err(LocateError::NotCached) | Err(LocateError::UnsupportedPlatform { .. }) => {
            info!("No cached PDFium; trying the system library");
            Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| LocateError::System(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Bind to a library at an explicit path.
pub fn bind_path(path: &Path) -> Result<Pdfium, LocateError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| LocateError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn download_into_cache(on_progress: Option<DownloadProgress<'_>>) -> Result<PathBuf, LocateError> {
    let platform = Platform::current()?;
    let dir = cache_dir();
    std::fs::create_dir_all(&dir).map_err(|source| LocateError::CacheDir {
        path: dir.clone(),
        source,
    })?;

    let url = platform.url();
    info!(%url, "Downloading PDFium");
    let archive = fetch(&url, on_progress)?;

    // Unpack beside the final name so a crash never leaves a truncated library.
    let dest = dir.join(platform.file_name);
    let partial = dir.join(format!("{}.partial", platform.file_name));
    unpack_member(&archive, platform.member, &partial)?;
    std::fs::rename(&partial, &dest).map_err(|source| LocateError::CacheDir {
        path: dest.clone(),
        source,
    })?;

    info!(path = %dest.display(), "PDFium cached");
    Ok(dest)
}

fn fetch(url: &str, on_progress: Option<DownloadProgress<'_>>) -> Result<Vec<u8>, LocateError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-locate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LocateError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| LocateError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(LocateError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LocateError::Download(format!("read: {e}"))),
        };
        body.extend_from_slice(&chunk[..n]);
        if let Some(cb) = on_progress {
            cb(body.len() as u64, total);
        }
    }
    Ok(body)
}

fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), LocateError> {
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| LocateError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| LocateError::Extract(e.to_string()))?;
        let is_member = entry
            .path()
            .map(|p| p.as_ref() == Path::new(member))
            .map_err(|e| LocateError::Extract(e.to_string()))?;
        if is_member {
            entry
                .unpack(dest)
                .map_err(|e| LocateError::Extract(format!("{member}: {e}")))?;
            return Ok(());
        }
    }

    Err(LocateError::Extract(format!("'{member}' missing from archive")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_targets_resolve() {
        let linux = Platform::for_target("linux", "x86_64").unwrap();
        assert_eq!(linux.file_name, "libpdfium.so");
        assert!(linux.url().ends_with("pdfium-linux-x64.tgz"));
        assert!(linux.url().contains(PDFIUM_VERSION));

        let win = Platform::for_target("windows", "x86").unwrap();
        assert_eq!(win.member, "bin/pdfium.dll");
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = Platform::for_target("plan9", "mips").unwrap_err();
        assert!(err.to_string().contains("plan9/mips"));
    }

    #[test]
    fn cache_dir_carries_version() {
        let dir = cache_dir();
        assert!(dir.to_string_lossy().contains(PDFIUM_VERSION));
        assert_eq!(dir, cache_dir());
    }

    #[test]
    fn unpack_finds_named_member() {
        let mut builder = tar::Builder::new(Vec::new());
        let payload = b"not really a shared library";
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "lib/libpdfium.so", &payload[..])
            .unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        std::io::Write::write_all(&mut gz, &tar_bytes).unwrap();
        let archive = gz.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        unpack_member(&archive, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), payload);

        let missing = unpack_member(&archive, "bin/pdfium.dll", &dir.path().join("x"));
        assert!(matches!(missing, Err(LocateError::Extract(_))));
    }
}
