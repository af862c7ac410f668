//! The persisted document: model identity → field key → JSON value.
//!
//! ```text
//! {
//!   "version": 1,
//!   "saved_at": "2026-10-16T09:30:00Z",
//!   "models": {
//!     "calc":   { "font_size": 14 },
//!     "viewer": { "zoom": 1.5 }
//!   }
//! }
//! ```
//!
//! Entries are kept as raw JSON so keys this build does not know about are
//! written back exactly as they were read.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Format version written at the document root.
pub const FORMAT_VERSION: u32 = 1;

/// One model's stored fields.
pub type Entry = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub models: BTreeMap<String, Entry>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self { version: FORMAT_VERSION, saved_at: None, models: BTreeMap::new() }
    }

    /// Parse document text read from `path`.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let doc: Document = serde_json::from_str(text).map_err(|e| Error::CorruptDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if doc.version > FORMAT_VERSION {
            tracing::warn!(
                path = %path.display(),
                version = doc.version,
                supported = FORMAT_VERSION,
                "document written by a newer format version"
            );
        }
        Ok(doc)
    }

    /// Pretty-printed JSON text.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn entry(&self, identity: &str) -> Option<&Entry> {
        self.models.get(identity)
    }

    /// The entry for `identity`, created empty if missing.
    pub fn entry_mut(&mut self, identity: &str) -> &mut Entry {
        self.models.entry(identity.to_string()).or_default()
    }

    pub fn remove(&mut self, identity: &str) -> Option<Entry> {
        self.models.remove(identity)
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Stamp the current format version and write time.
    pub fn touch(&mut self) {
        self.version = FORMAT_VERSION;
        self.saved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal() {
        let doc = Document::parse(r#"{"version": 1}"#, Path::new("s.json")).unwrap();
        assert!(doc.models.is_empty());
        assert!(doc.saved_at.is_none());
    }

    #[test]
    fn test_parse_keeps_unknown_value_shapes() {
        let text = r#"{"version": 1, "models": {"calc": {"history": [1, 2, 3], "font_size": 14}}}"#;
        let doc = Document::parse(text, Path::new("s.json")).unwrap();
        let entry = doc.entry("calc").unwrap();
        assert_eq!(entry["history"], json!([1, 2, 3]));
        assert_eq!(entry["font_size"], json!(14));
    }

    #[test]
    fn test_newer_version_still_loads() {
        let text = r#"{"version": 7, "models": {"calc": {"font_size": 14, "ligatures": true}}}"#;
        let doc = Document::parse(text, Path::new("s.json")).unwrap();
        assert_eq!(doc.version, 7);
        assert_eq!(doc.entry("calc").unwrap()["font_size"], json!(14));
        assert_eq!(doc.entry("calc").unwrap()["ligatures"], json!(true));
    }

    #[test]
    fn test_floats_survive_text_round_trip() {
        let mut doc = Document::new();
        for (i, f) in [10.359300090300103, 0.1 + 0.2, 1e-300, 123456.78901234567].iter().enumerate() {
            doc.entry_mut("viewer").insert(format!("f{i}"), json!(f));
        }
        let text = doc.to_json_string().unwrap();
        assert_eq!(Document::parse(&text, Path::new("s.json")).unwrap(), doc);
    }

    #[test]
    fn test_missing_version_is_corrupt() {
        let err = Document::parse(r#"{"models": {}}"#, Path::new("s.json")).unwrap_err();
        assert!(matches!(err, Error::CorruptDocument { .. }));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = Document::parse("{not json", Path::new("s.json")).unwrap_err();
        match err {
            Error::CorruptDocument { path, .. } => assert_eq!(path, Path::new("s.json")),
            other => panic!("expected CorruptDocument, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_mut_creates() {
        let mut doc = Document::new();
        doc.entry_mut("viewer").insert("zoom".into(), json!(1.5));
        assert_eq!(doc.identities().collect::<Vec<_>>(), vec!["viewer"]);
        assert!(doc.remove("viewer").is_some());
        assert!(doc.entry("viewer").is_none());
    }

    #[test]
    fn test_touch_stamps_time() {
        let mut doc = Document { version: 0, saved_at: None, models: BTreeMap::new() };
        doc.touch();
        assert_eq!(doc.version, FORMAT_VERSION);
        assert!(doc.saved_at.is_some());
        let text = doc.to_json_string().unwrap();
        assert!(text.contains("\"saved_at\""));
    }
}
