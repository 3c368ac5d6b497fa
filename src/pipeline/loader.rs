//! Document loading with the password fallback chain.
//!
//! 1. Open with no password.
//! 2. If the engine reports a password failure, retry once with the supplied
//!    password, or with `""` when none was supplied. Many "protected" PDFs
//!    only carry an owner password and open with an empty user password.
//! 3. Classify whatever is left as [`LoadError`].

use crate::engine::{PageSize, PdfEngine, SourceDocument};
use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a document was finally opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenedWith {
    NoPassword,
    EmptyPassword,
    Password,
}

/// A successfully opened document.
pub struct LoadedDocument<D> {
    pub document: D,
    pub opened_with: OpenedWith,
}

impl<D: SourceDocument> LoadedDocument<D> {
    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    /// Encrypted if it needed a password or still carries a security handler.
    pub fn is_encrypted(&self) -> bool {
        self.opened_with != OpenedWith::NoPassword || self.document.is_encrypted()
    }
}

/// One open attempt, with password failures refined.
///
/// A rejected non-empty password is [`LoadError::WrongPassword`]; a rejected
/// empty or absent password stays [`LoadError::Encrypted`].
pub fn open_once<'a, E: PdfEngine>(
    engine: &'a E,
    bytes: &[u8],
    password: Option<&str>,
) -> Result<E::Document<'a>, LoadError> {
    engine.open(bytes, password).map_err(|e| match (e, password) {
        (LoadError::Encrypted, Some(p)) if !p.is_empty() => LoadError::WrongPassword,
        (e, _) => e,
    })
}

/// Open `bytes`, trying no password first and then `password` (or `""`).
pub fn load<'a, E: PdfEngine>(
    engine: &'a E,
    bytes: &[u8],
    password: Option<&str>,
) -> Result<LoadedDocument<E::Document<'a>>, LoadError> {
    match open_once(engine, bytes, None) {
        Ok(document) => {
            return Ok(LoadedDocument {
                document,
                opened_with: OpenedWith::NoPassword,
            })
        }
        Err(LoadError::Encrypted) => {}
        Err(e) => return Err(e),
    }

    let retry = password.unwrap_or("");
    debug!(
        "Document is password-protected; retrying with {} password",
        if retry.is_empty() { "empty" } else { "supplied" }
    );
    let document = open_once(engine, bytes, Some(retry))?;
    Ok(LoadedDocument {
        document,
        opened_with: if retry.is_empty() {
            OpenedWith::EmptyPassword
        } else {
            OpenedWith::Password
        },
    })
}

/// Summary of an opened document, as printed by `pdfunlock inspect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub encrypted: bool,
    pub opened_with: OpenedWith,
    pub page_sizes: Vec<PageSize>,
}

pub fn describe<D: SourceDocument>(loaded: &LoadedDocument<D>) -> DocumentInfo {
    let page_sizes = (0..loaded.page_count())
        .filter_map(|i| loaded.document.page_size(i).ok())
        .collect();
    DocumentInfo {
        page_count: loaded.page_count(),
        encrypted: loaded.is_encrypted(),
        opened_with: loaded.opened_with,
        page_sizes,
    }
}
