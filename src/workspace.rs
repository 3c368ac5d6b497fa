//! The in-memory collection of source files and page references.
//!
//! Every [`PageReference`] points at a file by its position in
//! [`Workspace::files`]. Any mutation keeps that index valid: removing a file
//! drops its pages and shifts the indices of every later file's pages down by
//! one. Callers never edit indices by hand.

use crate::error::UnlockError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// An input document as bytes plus its display name.
///
/// After intake the bytes are always openable without a password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Same name, new content (the unlocked or flattened rendition).
    pub fn with_bytes(&self, bytes: Vec<u8>) -> Self {
        Self {
            name: self.name.clone(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// A PNG thumbnail, base64-encoded as a data URI.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub data_uri: String,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thumbnail({}x{}, {} chars)", self.width, self.height, self.data_uri.len())
    }
}

/// One page of one source file, as shown in the page grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReference {
    /// Unique for the lifetime of the workspace.
    pub id: String,
    pub file_index: usize,
    /// 0-based page number within the file.
    pub page_index: usize,
    pub file_name: String,
    pub thumbnail: Thumbnail,
}

/// A consistent copy of the workspace, handed to merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub version: u64,
    pub files: Vec<SourceFile>,
    pub pages: Vec<PageReference>,
}

/// Ordered source files plus the ordered page grid built from them.
#[derive(Debug, Default)]
pub struct Workspace {
    files: Vec<SourceFile>,
    pages: Vec<PageReference>,
    version: u64,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn pages(&self) -> &[PageReference] {
        &self.pages
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Index the next committed file will receive.
    pub fn next_file_index(&self) -> usize {
        self.files.len()
    }

    pub fn pages_of(&self, file_index: usize) -> impl Iterator<Item = &PageReference> {
        self.pages.iter().filter(move |p| p.file_index == file_index)
    }

    /// Append a file together with its page references.
    ///
    /// Every reference must already carry the index the file receives.
    pub fn commit_file(&mut self, file: SourceFile, pages: Vec<PageReference>) -> Result<usize, UnlockError> {
        let index = self.files.len();
        check_pages(&pages, index)?;
        debug!("Committing '{}' as file #{} with {} pages", file.name, index, pages.len());
        self.files.push(file);
        self.pages.extend(pages);
        self.touch();
        Ok(index)
    }

    /// Swap in a new rendition of file `index`.
    ///
    /// The new pages take the grid position of the file's first old page
    /// (or go to the end if it had none on the grid).
    pub fn replace_file(&mut self, index: usize, file: SourceFile, pages: Vec<PageReference>) -> Result<(), UnlockError> {
        self.check_file_index(index)?;
        check_pages(&pages, index)?;
        let at = self
            .pages
            .iter()
            .position(|p| p.file_index == index)
            .unwrap_or(self.pages.len());
        self.pages.retain(|p| p.file_index != index);
        let at = at.min(self.pages.len());
        self.pages.splice(at..at, pages);
        self.files[index] = file;
        self.touch();
        Ok(())
    }

    /// Remove file `index` and all its pages, reindexing later files.
    pub fn remove_file(&mut self, index: usize) -> Result<SourceFile, UnlockError> {
        self.check_file_index(index)?;
        let removed = self.files.remove(index);
        self.pages.retain(|p| p.file_index != index);
        for page in &mut self.pages {
            if page.file_index > index {
                page.file_index -= 1;
            }
        }
        debug!("Removed file #{} ('{}')", index, removed.name);
        self.touch();
        Ok(removed)
    }

    /// Drop one page from the grid. The source file is untouched.
    pub fn remove_page(&mut self, id: &str) -> Result<PageReference, UnlockError> {
        let pos = self.position(id)?;
        let page = self.pages.remove(pos);
        self.touch();
        Ok(page)
    }

    /// Move the page at grid position `from` to position `to`.
    pub fn move_page(&mut self, from: usize, to: usize) -> Result<(), UnlockError> {
        let len = self.pages.len();
        if from >= len || to >= len {
            return Err(UnlockError::InvalidOrder(format!(
                "cannot move position {from} to {to} in a grid of {len} pages"
            )));
        }
        let page = self.pages.remove(from);
        self.pages.insert(to, page);
        self.touch();
        Ok(())
    }

    /// Reorder the grid to match `ids`, which must be a permutation of the
    /// current page ids.
    pub fn reorder_pages(&mut self, ids: &[String]) -> Result<(), UnlockError> {
        if ids.len() != self.pages.len() {
            return Err(UnlockError::InvalidOrder(format!(
                "expected {} page ids, got {}",
                self.pages.len(),
                ids.len()
            )));
        }
        let unique: HashSet<&str> = ids.iter().map(String::as_str).collect();
        if unique.len() != ids.len() {
            return Err(UnlockError::InvalidOrder("duplicate page id".into()));
        }
        let mut reordered = Vec::with_capacity(ids.len());
        for id in ids {
            let pos = self.position(id)?;
            reordered.push(self.pages[pos].clone());
        }
        self.pages = reordered;
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.pages.clear();
        self.touch();
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            version: self.version,
            files: self.files.clone(),
            pages: self.pages.clone(),
        }
    }

    fn position(&self, id: &str) -> Result<usize, UnlockError> {
        self.pages
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| UnlockError::UnknownPage { id: id.to_string() })
    }

    fn check_file_index(&self, index: usize) -> Result<(), UnlockError> {
        if index >= self.files.len() {
            return Err(UnlockError::FileIndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        debug_assert!(self.pages.iter().all(|p| p.file_index < self.files.len()));
    }
}

fn check_pages(pages: &[PageReference], index: usize) -> Result<(), UnlockError> {
    match pages.iter().find(|p| p.file_index != index) {
        Some(p) => Err(UnlockError::Internal(format!(
            "page '{}' carries file index {}, expected {}",
            p.id, p.file_index, index
        ))),
        None => Ok(()),
    }
}
