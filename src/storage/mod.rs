//! # Document Store Trait
//!
//! This is the contract between the persistence manager and whatever holds
//! a persisted document. A store owns exactly one document (one scope).
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `FileStore` | `file` | JSON file on disk, written atomically |
//! | `MemoryStore` | `memory` | In-process text buffer for testing/embedding |

pub mod document;
pub mod file;
pub mod memory;

use std::path::Path;

use crate::Result;

pub use document::{Document, FORMAT_VERSION};
pub use file::FileStore;
pub use memory::MemoryStore;

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// Durable home of one persisted document.
///
/// Stores never merge; they hand back the whole document and replace it
/// whole. Merging is done by the persistence manager.
pub trait DocumentStore: Send + Sync {
    /// Read the document. `Ok(None)` when it has never been written.
    ///
    /// An unparsable document is `Error::CorruptDocument`.
    fn read(&self) -> Result<Option<Document>>;

    /// Replace the document. Either the old or the new document survives a
    /// failure; never a mix.
    fn write(&self, document: &Document) -> Result<()>;

    /// Where the document lives, for error messages and logs.
    fn location(&self) -> &Path;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn read(&self) -> Result<Option<Document>> {
        (**self).read()
    }

    fn write(&self, document: &Document) -> Result<()> {
        (**self).write(document)
    }

    fn location(&self) -> &Path {
        (**self).location()
    }
}
