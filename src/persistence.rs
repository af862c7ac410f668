//! Persistence manager: moves field values between live model instances and
//! the settings and workspace documents.
//!
//! ```text
//! ModelInstance ──snapshot──▶ merge into entry ──▶ DocumentStore::write
//! ModelInstance ◀──restore─── entry for identity ◀── DocumentStore::read
//! ```
//!
//! The manager holds no values between calls. Every save re-reads the
//! document and merges into it, so entries of other models and keys this
//! build does not know are preserved.

use std::path::Path;

use crate::config::StoreConfig;
use crate::model::{DocState, ModelInstance, RestoreReport, Scope};
use crate::storage::{Document, DocumentStore, FileStore};
use crate::{Error, Result};

/// Per-scope outcome of a `load`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub settings: RestoreReport,
    pub workspace: RestoreReport,
}

impl LoadReport {
    pub fn scope(&self, scope: Scope) -> &RestoreReport {
        match scope {
            Scope::Settings => &self.settings,
            Scope::Workspace => &self.workspace,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.settings.is_clean() && self.workspace.is_clean()
    }
}

// ============================================================================
// PersistenceManager
// ============================================================================

/// Loads and saves model instances against one settings document and one
/// workspace document.
pub struct PersistenceManager<S: DocumentStore = FileStore> {
    settings: S,
    workspace: S,
}

impl PersistenceManager<FileStore> {
    /// File-backed manager at the configured paths.
    pub fn open(config: &StoreConfig) -> Self {
        Self::with_stores(
            FileStore::new(&config.settings_path),
            FileStore::new(&config.workspace_path),
        )
    }
}

impl<S: DocumentStore> PersistenceManager<S> {
    pub fn with_stores(settings: S, workspace: S) -> Self {
        Self { settings, workspace }
    }

    pub fn store(&self, scope: Scope) -> &S {
        match scope {
            Scope::Settings => &self.settings,
            Scope::Workspace => &self.workspace,
        }
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Restore both scopes of `instance` from their documents.
    ///
    /// Both documents are read before anything is applied; a corrupt
    /// document leaves the instance exactly as it was.
    pub fn load(&self, instance: &mut ModelInstance) -> Result<LoadReport> {
        let settings = self.settings.read()?;
        let workspace = self.workspace.read()?;
        Ok(LoadReport {
            settings: self.apply(instance, Scope::Settings, settings.as_ref()),
            workspace: self.apply(instance, Scope::Workspace, workspace.as_ref()),
        })
    }

    /// Restore one scope of `instance` from its document.
    pub fn load_scope(&self, instance: &mut ModelInstance, scope: Scope) -> Result<RestoreReport> {
        let document = self.store(scope).read()?;
        Ok(self.apply(instance, scope, document.as_ref()))
    }

    fn apply(&self, instance: &mut ModelInstance, scope: Scope, document: Option<&Document>) -> RestoreReport {
        let mut report = RestoreReport::default();
        let category = scope.category();
        let catalogue = std::sync::Arc::clone(instance.catalogue());

        match document.and_then(|d| d.entry(instance.identity())) {
            Some(entry) => {
                for field in catalogue.in_category(category) {
                    let Some(raw) = entry.get(field.persist_key()) else {
                        continue;
                    };
                    instance.restore_field(field.name(), field.decode(raw), &mut report);
                }
                report.ignored = entry
                    .keys()
                    .filter(|key| catalogue.by_persist_key(category, key).is_none())
                    .cloned()
                    .collect();
            }
            None => {
                tracing::debug!(
                    identity = instance.identity(),
                    %scope,
                    path = %self.store(scope).location().display(),
                    "no stored entry, keeping defaults"
                );
            }
        }

        instance.set_state(scope, DocState::Loaded);
        report
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Save both scopes of `instance`.
    ///
    /// Scopes are written one after the other; if the workspace write fails
    /// the settings document has already been replaced.
    pub fn save(&self, instance: &mut ModelInstance) -> Result<()> {
        for scope in Scope::ALL {
            self.save_scope(instance, scope)?;
        }
        Ok(())
    }

    /// Merge the instance's fields of `scope` into its document.
    ///
    /// A model with no fields in this scope writes nothing. An existing
    /// document that cannot be parsed is left alone and reported as
    /// `CorruptDocument`.
    pub fn save_scope(&self, instance: &mut ModelInstance, scope: Scope) -> Result<()> {
        let catalogue = std::sync::Arc::clone(instance.catalogue());
        let mut fields = catalogue.in_category(scope.category()).peekable();
        if fields.peek().is_none() {
            return Ok(());
        }

        let store = self.store(scope);
        let mut document = store.read()?.unwrap_or_default();
        let entry = document.entry_mut(instance.identity());
        for field in fields {
            entry.insert(field.persist_key().to_string(), field.encode(instance.get(field.name())?));
        }
        document.touch();
        store.write(&document)?;

        tracing::debug!(
            identity = instance.identity(),
            %scope,
            path = %store.location().display(),
            "model saved"
        );
        instance.set_state(scope, DocState::Saved);
        Ok(())
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Forget the stored entry for the instance in `scope` and put its
    /// fields of that scope back to their defaults.
    pub fn reset(&self, instance: &mut ModelInstance, scope: Scope) -> Result<()> {
        let store = self.store(scope);
        if let Some(mut document) = store.read()? {
            if document.remove(instance.identity()).is_some() {
                document.touch();
                store.write(&document)?;
            }
        }
        let outcome = instance.reset_to_defaults(scope.category());
        instance.set_state(scope, DocState::Saved);
        outcome
    }

    /// Model identities that have an entry in the document of `scope`.
    pub fn stored_identities(&self, scope: Scope) -> Result<Vec<String>> {
        Ok(self
            .store(scope)
            .read()?
            .map(|d| d.identities().map(str::to_string).collect())
            .unwrap_or_default())
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// Copy the settings document to `path`.
    pub fn export_settings(&self, path: &Path) -> Result<()> {
        let document = self.settings.read()?.unwrap_or_default();
        FileStore::new(path).write(&document)
    }

    /// Merge a previously exported settings document into the settings
    /// document. Entries for imported identities replace existing ones.
    ///
    /// Live instances are not touched; `load` them to pick up the values.
    /// Returns the imported identities.
    pub fn import_settings(&self, path: &Path) -> Result<Vec<String>> {
        let source = FileStore::new(path);
        let imported = source.read()?.ok_or_else(|| Error::StorageUnavailable {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nothing to import"),
        })?;

        let mut document = self.settings.read()?.unwrap_or_default();
        let identities: Vec<String> = imported.identities().map(str::to_string).collect();
        document.models.extend(imported.models);
        document.touch();
        self.settings.write(&document)?;

        tracing::debug!(path = %path.display(), models = identities.len(), "settings imported");
        Ok(identities)
    }
}
