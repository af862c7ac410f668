//! In-memory document store.
//!
//! This is the reference implementation of `DocumentStore`. It keeps the
//! serialized document text behind an `RwLock`, so reads go through the same
//! parser as files do and tests can plant malformed text.
//!
//! Use this store for:
//! - Testing persistence behaviour without touching the filesystem
//! - Embedding models whose state should not outlive the process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Document, DocumentStore};
use crate::Result;

/// Shared in-process document. Clones see the same contents.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: PathBuf,
    text: Arc<RwLock<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::named("<memory>")
    }

    /// An empty store reported under `name` in errors.
    pub fn named(name: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), text: Arc::new(RwLock::new(None)) }
    }

    /// A store that already holds `text`, parsed on first read.
    pub fn with_contents(text: impl Into<String>) -> Self {
        let store = Self::new();
        *store.text.write() = Some(text.into());
        store
    }

    /// Raw document text, if anything was written.
    pub fn contents(&self) -> Option<String> {
        self.text.read().clone()
    }

    pub fn clear(&self) {
        *self.text.write() = None;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self) -> Result<Option<Document>> {
        match self.text.read().as_deref() {
            Some(text) => Document::parse(text, &self.name).map(Some),
            None => Ok(None),
        }
    }

    fn write(&self, document: &Document) -> Result<()> {
        let text = document.to_json_string()?;
        *self.text.write() = Some(text);
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.name
    }
}
