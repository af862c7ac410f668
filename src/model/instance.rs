//! Live model instance: current values, write validation, notification.

use std::sync::Arc;

use hashbrown::HashMap;

use super::observer::{BoxError, FieldChange, ObserverFailure, ObserverId, ObserverList};
use super::{Category, FieldDescriptor, Scope, ValidationError, Value};
use crate::registry::{self, Catalogue, ModelClass};
use crate::{Error, Result};

/// Field name → value.
pub type FieldMap = HashMap<String, Value>;

/// Where an instance stands relative to one persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocState {
    /// Never loaded from or saved to the document.
    Unloaded,
    /// Values match what was last loaded.
    Loaded,
    /// A field of this scope changed since the last load or save.
    Dirty,
    /// Values match what was last saved.
    Saved,
}

/// Outcome of a restore: which fields took stored values, which fell back
/// to their defaults, and which stored keys had no matching field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub applied: Vec<String>,
    pub defaulted: Vec<(String, ValidationError)>,
    pub ignored: Vec<String>,
}

impl RestoreReport {
    /// True when every stored value was accepted and nothing was ignored.
    pub fn is_clean(&self) -> bool {
        self.defaulted.is_empty() && self.ignored.is_empty()
    }
}

// ============================================================================
// ModelInstance
// ============================================================================

/// Current field values of one live model.
///
/// Every catalogued field always has exactly one value; defaults are
/// materialized at construction.
#[derive(Debug)]
pub struct ModelInstance {
    identity: String,
    catalogue: Arc<Catalogue>,
    values: FieldMap,
    observers: ObserverList,
    settings_state: DocState,
    workspace_state: DocState,
}

impl ModelInstance {
    /// Instance of class `C` persisted under `identity` (e.g. a feature id,
    /// or `"global"`).
    pub fn new<C: ModelClass>(identity: impl Into<String>) -> Result<Self> {
        Ok(Self::from_catalogue(identity, registry::catalogue_for::<C>()?))
    }

    pub fn from_catalogue(identity: impl Into<String>, catalogue: Arc<Catalogue>) -> Self {
        let values = catalogue
            .iter()
            .map(|f| (f.name().to_string(), f.default_value().clone()))
            .collect();
        Self {
            identity: identity.into(),
            catalogue,
            values,
            observers: ObserverList::default(),
            settings_state: DocState::Unloaded,
            workspace_state: DocState::Unloaded,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.values.get(name).ok_or_else(|| self.unknown(name))
    }

    pub fn field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.catalogue.get(name).ok_or_else(|| self.unknown(name))
    }

    /// Values of every persisted (non-transient) field.
    pub fn snapshot(&self) -> FieldMap {
        self.catalogue
            .iter()
            .filter(|f| f.is_persisted())
            .map(|f| (f.name().to_string(), self.values[f.name()].clone()))
            .collect()
    }

    /// Values of the fields in one category.
    pub fn snapshot_category(&self, category: Category) -> FieldMap {
        self.catalogue
            .in_category(category)
            .map(|f| (f.name().to_string(), self.values[f.name()].clone()))
            .collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Validate and store `value`, then notify observers.
    ///
    /// A rejected value leaves the instance untouched. Observer failures are
    /// returned as `NotificationFailed` after the write has been applied.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let field = self.field(name)?;
        let accepted = field.validate(value.into())?;
        self.assign(name, accepted)
    }

    /// Write every field of `category` back to its default.
    pub fn reset_to_defaults(&mut self, category: Category) -> Result<()> {
        let catalogue = Arc::clone(&self.catalogue);
        let mut failures = Vec::new();
        for field in catalogue.in_category(category) {
            match self.assign(field.name(), field.default_value().clone()) {
                Ok(()) => {}
                Err(Error::NotificationFailed(mut f)) => failures.append(&mut f),
                Err(other) => return Err(other),
            }
        }
        into_result(failures)
    }

    /// Apply stored values over the current ones.
    ///
    /// Keys with no catalogued field are ignored. A value the field rejects
    /// is logged and the field falls back to its default; the rest of the
    /// restore carries on.
    pub fn restore(&mut self, mapping: &FieldMap) -> RestoreReport {
        let catalogue = Arc::clone(&self.catalogue);
        let mut report = RestoreReport::default();
        for field in catalogue.iter() {
            if let Some(value) = mapping.get(field.name()) {
                self.restore_field(field.name(), Ok(value.clone()), &mut report);
            }
        }
        let mut ignored: Vec<String> = mapping
            .keys()
            .filter(|k| !catalogue.contains(k))
            .cloned()
            .collect();
        ignored.sort();
        report.ignored = ignored;
        report
    }

    /// Restore one field from a stored candidate, falling back to the
    /// default when the candidate is unusable.
    pub(crate) fn restore_field(
        &mut self,
        name: &str,
        candidate: std::result::Result<Value, ValidationError>,
        report: &mut RestoreReport,
    ) {
        let outcome = match candidate {
            Ok(value) => self.set(name, value),
            Err(e) => Err(Error::Validation(e)),
        };
        match outcome {
            Ok(()) => report.applied.push(name.to_string()),
            Err(Error::NotificationFailed(failures)) => {
                log_observer_failures(&self.identity, &failures);
                report.applied.push(name.to_string());
            }
            Err(Error::Validation(e)) => {
                tracing::warn!(
                    model = %self.identity,
                    field = name,
                    error = %e,
                    "stored value rejected, falling back to default"
                );
                if let Ok(default) = self.field(name).map(|f| f.default_value().clone()) {
                    if let Err(Error::NotificationFailed(failures)) = self.assign(name, default) {
                        log_observer_failures(&self.identity, &failures);
                    }
                }
                report.defaulted.push((name.to_string(), e));
            }
            Err(other) => {
                tracing::warn!(model = %self.identity, field = name, error = %other, "restore skipped field");
            }
        }
    }

    /// Store an already-validated value and fan out the change.
    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        let category = self.field(name)?.category();
        let old = match self.values.get_mut(name) {
            Some(slot) => std::mem::replace(slot, value),
            None => return Err(self.unknown(name)),
        };
        if let Some(scope) = category.scope() {
            self.set_state(scope, DocState::Dirty);
        }

        let change = FieldChange {
            model: &self.identity,
            field: name,
            old: &old,
            new: &self.values[name],
        };
        into_result(self.observers.notify(&change))
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register a callback run synchronously after every committed write.
    pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&FieldChange<'_>) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // ========================================================================
    // Persistence state
    // ========================================================================

    pub fn state(&self, scope: Scope) -> DocState {
        match scope {
            Scope::Settings => self.settings_state,
            Scope::Workspace => self.workspace_state,
        }
    }

    pub(crate) fn set_state(&mut self, scope: Scope, state: DocState) {
        match scope {
            Scope::Settings => self.settings_state = state,
            Scope::Workspace => self.workspace_state = state,
        }
    }

    /// True when either document is behind the in-memory values.
    pub fn is_dirty(&self) -> bool {
        Scope::ALL.iter().any(|s| self.state(*s) == DocState::Dirty)
    }

    fn unknown(&self, name: &str) -> Error {
        Error::UnknownField {
            model: self.identity.clone(),
            field: name.to_string(),
        }
    }
}

fn into_result(failures: Vec<ObserverFailure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::NotificationFailed(failures))
    }
}

fn log_observer_failures(model: &str, failures: &[ObserverFailure]) {
    for failure in failures {
        tracing::warn!(model, %failure, "observer failed during restore");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClassBody;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct Editor;
    impl ModelClass for Editor {
        const NAME: &'static str = "Editor";
        type Base = ();
        fn declare(body: &mut ClassBody) {
            body.field(FieldDescriptor::int_range("font_size", 12, 8, 72))
                .field(FieldDescriptor::choice("theme", ["auto", "light", "dark"], "auto"))
                .field(FieldDescriptor::string("last_file", "").workspace())
                .field(FieldDescriptor::int("cursor", 0).transient());
        }
    }

    fn editor() -> ModelInstance {
        ModelInstance::new::<Editor>("editor").unwrap()
    }

    #[test]
    fn test_defaults_materialized() {
        let m = editor();
        assert_eq!(m.get("font_size").unwrap(), &Value::Int(12));
        assert_eq!(m.get("theme").unwrap(), &Value::from("auto"));
        assert_eq!(m.get("cursor").unwrap(), &Value::Int(0));
        assert_eq!(m.state(Scope::Settings), DocState::Unloaded);
        assert!(!m.is_dirty());
    }

    #[test]
    fn test_unknown_field() {
        let mut m = editor();
        assert!(matches!(m.get("nope"), Err(Error::UnknownField { .. })));
        assert!(matches!(m.set("nope", 1), Err(Error::UnknownField { .. })));
    }

    #[test]
    fn test_rejected_write_leaves_value() {
        let mut m = editor();
        let err = m.set("font_size", 96).unwrap_err();
        assert!(matches!(err.as_validation(), Some(ValidationError::Range { .. })));
        assert_eq!(m.get("font_size").unwrap(), &Value::Int(12));
        assert!(!m.is_dirty());

        m.set("font_size", 14).unwrap();
        assert_eq!(m.get("font_size").unwrap(), &Value::Int(14));
        assert_eq!(m.state(Scope::Settings), DocState::Dirty);
        assert_eq!(m.state(Scope::Workspace), DocState::Unloaded);
    }

    #[test]
    fn test_snapshot_excludes_transient() {
        let mut m = editor();
        m.set("cursor", 40).unwrap();
        let snap = m.snapshot();
        assert_eq!(snap.len(), 3);
        assert!(!snap.contains_key("cursor"));
        assert_eq!(m.snapshot_category(Category::Workspace).len(), 1);
        assert!(!m.is_dirty());
    }

    #[test]
    fn test_observer_sees_old_and_new() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut m = editor();
        let sink = std::sync::Arc::clone(&seen);
        m.subscribe(move |c| {
            sink.lock().push((c.model.to_string(), c.field.to_string(), c.old.clone(), c.new.clone()));
            Ok(())
        });

        m.set("theme", "dark").unwrap();
        assert!(m.set("theme", "blue").is_err());

        assert_eq!(
            *seen.lock(),
            vec![("editor".to_string(), "theme".to_string(), Value::from("auto"), Value::from("dark"))]
        );
    }

    #[test]
    fn test_observer_failure_reported_after_commit() {
        let mut m = editor();
        m.subscribe(|_| Err("boom".into()));
        let calls = std::sync::Arc::new(Mutex::new(0));
        let counter = std::sync::Arc::clone(&calls);
        m.subscribe(move |_| {
            *counter.lock() += 1;
            Ok(())
        });

        match m.set("font_size", 20) {
            Err(Error::NotificationFailed(failures)) => assert_eq!(failures.len(), 1),
            other => panic!("expected NotificationFailed, got {other:?}"),
        }
        assert_eq!(m.get("font_size").unwrap(), &Value::Int(20));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_restore_tolerates_bad_fields() {
        let mut m = editor();
        m.set("theme", "light").unwrap();

        let mut stored = FieldMap::new();
        stored.insert("font_size".into(), Value::Int(16));
        stored.insert("theme".into(), Value::from("neon"));
        stored.insert("legacy_flag".into(), Value::Bool(true));

        let report = m.restore(&stored);
        assert_eq!(report.applied, vec!["font_size".to_string()]);
        assert_eq!(report.defaulted.len(), 1);
        assert_eq!(report.defaulted[0].0, "theme");
        assert_eq!(report.ignored, vec!["legacy_flag".to_string()]);
        assert!(!report.is_clean());

        assert_eq!(m.get("font_size").unwrap(), &Value::Int(16));
        assert_eq!(m.get("theme").unwrap(), &Value::from("auto"));
        assert_eq!(m.get("last_file").unwrap(), &Value::from(""));
    }

    #[test]
    fn test_restore_logs_observer_failures() {
        let mut m = editor();
        let calls = std::sync::Arc::new(Mutex::new(0));
        let counter = std::sync::Arc::clone(&calls);
        m.subscribe(move |_| {
            *counter.lock() += 1;
            Err("repaint failed".into())
        });

        let mut stored = FieldMap::new();
        stored.insert("font_size".into(), Value::Int(18));
        stored.insert("theme".into(), Value::from("neon"));

        let report = m.restore(&stored);
        assert_eq!(report.applied, vec!["font_size".to_string()]);
        assert_eq!(report.defaulted.len(), 1);
        assert_eq!(m.get("font_size").unwrap(), &Value::Int(18));
        assert_eq!(m.get("theme").unwrap(), &Value::from("auto"));
        // One delivery for the applied value, one for the fallback to the default.
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut m = editor();
        m.set("font_size", 30).unwrap();
        m.set("last_file", "/tmp/a.txt").unwrap();
        m.reset_to_defaults(Category::Settings).unwrap();
        assert_eq!(m.get("font_size").unwrap(), &Value::Int(12));
        assert_eq!(m.get("last_file").unwrap(), &Value::from("/tmp/a.txt"));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let calls = std::sync::Arc::new(Mutex::new(0));
        let counter = std::sync::Arc::clone(&calls);
        let mut m = editor();
        let id = m.subscribe(move |_| {
            *counter.lock() += 1;
            Ok(())
        });
        m.set("font_size", 13).unwrap();
        assert!(m.unsubscribe(id));
        m.set("font_size", 14).unwrap();
        assert_eq!(*calls.lock(), 1);
        assert_eq!(m.observer_count(), 0);
    }
}
