//! JSON file store.
//!
//! Writes go to a uniquely named hidden temporary file next to the target,
//! are flushed to disk, then renamed over the target. A crash mid-write
//! leaves the previous document in place, and concurrent writers never share
//! a temporary file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{Document, DocumentStore};
use crate::{Error, Result};

/// One persisted document stored as a JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hidden prefix for this document's temporary files.
    fn temp_prefix(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        format!(".{name}.")
    }

    fn unavailable(&self, source: std::io::Error) -> Error {
        Error::StorageUnavailable { path: self.path.clone(), source }
    }
}

impl DocumentStore for FileStore {
    fn read(&self) -> Result<Option<Document>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Document::parse(&text, &self.path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(Error::CorruptDocument {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    fn write(&self, document: &Document) -> Result<()> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| self.unavailable(e))?;
                parent
            }
            None => Path::new("."),
        };

        let text = document.to_json_string()?;
        // Dropped without `persist`, the temp file deletes itself.
        let mut tmp = tempfile::Builder::new()
            .prefix(&self.temp_prefix())
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| self.unavailable(e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|()| tmp.write_all(b"\n"))
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| self.unavailable(e))?;
        tmp.persist(&self.path).map_err(|e| self.unavailable(e.error))?;

        tracing::debug!(path = %self.path.display(), models = document.models.len(), "document written");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
