//! # field-persist: Declarative Model Fields with Durable Storage
//!
//! Typed, validated model properties that persist themselves.
//!
//! ## Design Principles
//!
//! 1. **Declare once**: a `ModelClass` lists its fields; the registry turns
//!    that into a cached, ordered `Catalogue`
//! 2. **No partial writes**: `ModelInstance::set` validates before it touches
//!    the value map
//! 3. **Documents are merged, never clobbered**: saving one model keeps every
//!    other model's entry, and keeps keys this build no longer knows about
//! 4. **Storage is a seam**: `DocumentStore` is the contract between the
//!    persistence manager and the medium
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use field_persist::{
//!     Category, ClassBody, FieldDescriptor, ModelClass, ModelInstance,
//!     PersistenceManager, StoreConfig,
//! };
//!
//! struct EditorSettings;
//!
//! impl ModelClass for EditorSettings {
//!     const NAME: &'static str = "EditorSettings";
//!     type Base = ();
//!
//!     fn declare(body: &mut ClassBody) {
//!         body.field(
//!             FieldDescriptor::int_range("font_size", 12, 8, 72)
//!                 .describe("Editor font size in points"),
//!         );
//!         body.field(
//!             FieldDescriptor::choice("theme", ["auto", "light", "dark"], "auto")
//!                 .describe("Colour theme"),
//!         );
//!         body.field(
//!             FieldDescriptor::string("last_file", "")
//!                 .with_category(Category::Workspace),
//!         );
//!     }
//! }
//!
//! # fn example() -> field_persist::Result<()> {
//! let manager = PersistenceManager::open(&StoreConfig::for_app("my-app")?);
//!
//! let mut editor = ModelInstance::new::<EditorSettings>("editor")?;
//! manager.load(&mut editor)?;
//!
//! editor.set("font_size", 14)?;
//! manager.save(&mut editor)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `FileStore` | `storage::file` | JSON file, atomic replace on write |
//! | `MemoryStore` | `storage::memory` | In-process text buffer for tests/embedding |

use std::path::PathBuf;

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod registry;
pub mod storage;
pub mod persistence;
pub mod config;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Value, FieldDescriptor, FieldKind, Category, Scope, ValidationError,
    ModelInstance, FieldMap, DocState, RestoreReport,
    FieldChange, ObserverId, ObserverFailure, BoxError,
};

// ============================================================================
// Re-exports: Registry
// ============================================================================

pub use registry::{ModelClass, ClassBody, Catalogue, catalogue_for};

// ============================================================================
// Re-exports: Storage & persistence
// ============================================================================

pub use storage::{DocumentStore, Document, FileStore, MemoryStore, FORMAT_VERSION};
pub use persistence::{PersistenceManager, LoadReport};
pub use config::StoreConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("Field '{field}' declared more than once in class '{class}'")]
    DuplicateField { class: String, field: String },

    #[error("Default of field '{field}' in class '{class}' violates its constraints: {source}")]
    InvalidDefault {
        class: String,
        field: String,
        source: ValidationError,
    },

    #[error("Fields '{first}' and '{second}' of class '{class}' are both stored under key '{key}'")]
    PersistKeyCollision {
        class: String,
        key: String,
        first: String,
        second: String,
    },

    #[error("Model class '{class}' inherits from itself")]
    InheritanceCycle { class: String },

    #[error("Storage unavailable at {}: {source}", .path.display())]
    StorageUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt document at {}: {reason}", .path.display())]
    CorruptDocument { path: PathBuf, reason: String },

    #[error("{} observer(s) failed after the write was applied", .0.len())]
    NotificationFailed(Vec<ObserverFailure>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The validation failure behind this error, if it is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
