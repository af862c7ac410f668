//! Synchronous change notification.
//!
//! Observers run on the caller's thread, in registration order, before
//! `ModelInstance::set` returns. A failing observer does not stop delivery;
//! failures are collected and handed back to the writer.

use std::fmt;

use smallvec::SmallVec;

use super::Value;

/// Error type observers report.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked for every committed write.
pub type Observer = Box<dyn FnMut(&FieldChange<'_>) -> Result<(), BoxError> + Send>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// One committed write, as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldChange<'a> {
    /// Identity of the model instance that changed.
    pub model: &'a str,
    pub field: &'a str,
    pub old: &'a Value,
    pub new: &'a Value,
}

/// An observer that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    pub observer: ObserverId,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed on '{}': {}", self.observer, self.field, self.message)
    }
}

// ============================================================================
// ObserverList
// ============================================================================

/// Ordered subscriber list owned by one model instance.
#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: u64,
    entries: SmallVec<[(ObserverId, Observer); 4]>,
}

impl ObserverList {
    pub(crate) fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&FieldChange<'_>) -> Result<(), BoxError> + Send + 'static,
    {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.entries.push((id, Box::new(observer) as Observer));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(eid, _)| *eid != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Deliver `change` to every observer; returns the ones that failed.
    pub(crate) fn notify(&mut self, change: &FieldChange<'_>) -> Vec<ObserverFailure> {
        let mut failures = Vec::new();
        for (id, observer) in self.entries.iter_mut() {
            if let Err(e) = observer(change) {
                failures.push(ObserverFailure {
                    observer: *id,
                    field: change.field.to_string(),
                    message: e.to_string(),
                });
            }
        }
        failures
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.entries.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use parking_lot::Mutex;

    fn change<'a>(old: &'a Value, new: &'a Value) -> FieldChange<'a> {
        FieldChange { model: "calc", field: "font_size", old, new }
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut list = ObserverList::default();
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            list.subscribe(move |_| {
                seen.lock().push(tag);
                Ok(())
            });
        }
        let (old, new) = (Value::Int(12), Value::Int(14));
        assert!(list.notify(&change(&old, &new)).is_empty());
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failure_does_not_block_later_observers() {
        let reached = Arc::new(Mutex::new(false));
        let mut list = ObserverList::default();
        let bad = list.subscribe(|_| Err("widget gone".into()));
        let flag = Arc::clone(&reached);
        list.subscribe(move |_| {
            *flag.lock() = true;
            Ok(())
        });

        let (old, new) = (Value::Int(12), Value::Int(14));
        let failures = list.notify(&change(&old, &new));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].observer, bad);
        assert_eq!(failures[0].message, "widget gone");
        assert!(*reached.lock());
    }

    #[test]
    fn test_unsubscribe() {
        let mut list = ObserverList::default();
        let a = list.subscribe(|_| Ok(()));
        let b = list.subscribe(|_| Ok(()));
        assert_ne!(a, b);
        assert!(list.unsubscribe(a));
        assert!(!list.unsubscribe(a));
        assert_eq!(list.len(), 1);
    }
}
