//! Field descriptors: the typed, validated declaration of one model property.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Value;

// ============================================================================
// Persistence category
// ============================================================================

/// Which persisted document a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Saved in the settings document (user preferences).
    Settings,
    /// Saved in the workspace document (session state).
    Workspace,
    /// Never serialized.
    Transient,
}

impl Category {
    /// The document scope this category is stored in. `None` for transient.
    pub fn scope(self) -> Option<Scope> {
        match self {
            Category::Settings => Some(Scope::Settings),
            Category::Workspace => Some(Scope::Workspace),
            Category::Transient => None,
        }
    }
}

/// One of the two persisted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Settings,
    Workspace,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Settings, Scope::Workspace];

    pub fn category(self) -> Category {
        match self {
            Scope::Settings => Category::Settings,
            Scope::Workspace => Category::Workspace,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Settings => "settings",
            Scope::Workspace => "workspace",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Kinds and their constraints
// ============================================================================

/// Field kind together with its kind-specific constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String { max_length: Option<usize> },
    Integer { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    Boolean,
    /// Allowed set, in declaration order.
    Choice { choices: Vec<Value> },
    Path { must_exist: bool },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String { .. } => "STRING",
            FieldKind::Integer { .. } => "INTEGER",
            FieldKind::Float { .. } => "FLOAT",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::Choice { .. } => "CHOICE",
            FieldKind::Path { .. } => "PATH",
        }
    }
}

// ============================================================================
// Validation errors
// ============================================================================

/// Why a candidate value was rejected by a field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: {value} is outside {range}")]
    Range { field: String, value: String, range: String },

    #[error("{field}: expected {expected}, got {got}")]
    Type { field: String, expected: String, got: String },

    #[error("{field}: {value} is not one of {choices}")]
    InvalidChoice { field: String, value: String, choices: String },

    #[error("{field}: path does not exist: {}", .path.display())]
    PathNotFound { field: String, path: std::path::PathBuf },

    #[error("{field}: {value} rejected by field validator")]
    Rejected { field: String, value: String },
}

impl ValidationError {
    /// Name of the field that rejected the value.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Range { field, .. }
            | ValidationError::Type { field, .. }
            | ValidationError::InvalidChoice { field, .. }
            | ValidationError::PathNotFound { field, .. }
            | ValidationError::Rejected { field, .. } => field,
        }
    }
}

// ============================================================================
// FieldDescriptor
// ============================================================================

/// Declaration of one typed property on a model class.
///
/// Built with a kind constructor and refined with the chained setters:
///
/// ```rust
/// use field_persist::{Category, FieldDescriptor};
///
/// let zoom = FieldDescriptor::float_range("zoom", 1.0, 0.25, 8.0)
///     .describe("Viewer zoom factor")
///     .with_category(Category::Workspace);
/// assert!(zoom.validate(2.0.into()).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    default: Value,
    description: String,
    category: Category,
    persist_as: Option<String>,
    hooks: Hooks,
}

// ============================================================================
// Custom hooks
// ============================================================================

/// Extra predicate run on the normalized value after the kind check.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Converts a value into the JSON stored in a document.
pub type Serializer = Arc<dyn Fn(&Value) -> serde_json::Value + Send + Sync>;

/// Converts stored JSON back into a value. `None` when the JSON is unusable.
pub type Deserializer = Arc<dyn Fn(&serde_json::Value) -> Option<Value> + Send + Sync>;

/// Optional per-field callbacks. Compared by identity.
#[derive(Clone, Default)]
struct Hooks {
    validator: Option<Validator>,
    serializer: Option<Serializer>,
    deserializer: Option<Deserializer>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("validator", &self.validator.is_some())
            .field("serializer", &self.serializer.is_some())
            .field("deserializer", &self.deserializer.is_some())
            .finish()
    }
}

impl PartialEq for Hooks {
    fn eq(&self, other: &Self) -> bool {
        fn same<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        same(&self.validator, &other.validator)
            && same(&self.serializer, &other.serializer)
            && same(&self.deserializer, &other.deserializer)
    }
}

impl FieldDescriptor {
    /// General constructor. The default is checked against the constraints
    /// when the owning catalogue is built.
    pub fn new(name: impl Into<String>, kind: FieldKind, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            default: default.into(),
            description: String::new(),
            category: Category::Settings,
            persist_as: None,
            hooks: Hooks::default(),
        }
    }

    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String { max_length: None }, Value::String(default.into()))
    }

    pub fn bounded_string(name: impl Into<String>, default: impl Into<String>, max_length: usize) -> Self {
        Self::new(
            name,
            FieldKind::String { max_length: Some(max_length) },
            Value::String(default.into()),
        )
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, FieldKind::Integer { min: None, max: None }, default)
    }

    pub fn int_range(name: impl Into<String>, default: i64, min: i64, max: i64) -> Self {
        Self::new(name, FieldKind::Integer { min: Some(min), max: Some(max) }, default)
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, FieldKind::Float { min: None, max: None }, default)
    }

    pub fn float_range(name: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        Self::new(name, FieldKind::Float { min: Some(min), max: Some(max) }, default)
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, FieldKind::Boolean, default)
    }

    pub fn choice<I, V>(name: impl Into<String>, choices: I, default: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let choices = choices.into_iter().map(Into::into).collect();
        Self::new(name, FieldKind::Choice { choices }, default)
    }

    pub fn path(name: impl Into<String>, default: impl Into<std::path::PathBuf>) -> Self {
        Self::new(name, FieldKind::Path { must_exist: false }, Value::Path(default.into()))
    }

    /// A path field whose value must exist on disk when it is written.
    pub fn existing_path(name: impl Into<String>, default: impl Into<std::path::PathBuf>) -> Self {
        Self::new(name, FieldKind::Path { must_exist: true }, Value::Path(default.into()))
    }

    // ------------------------------------------------------------------------
    // Chained setters
    // ------------------------------------------------------------------------

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn workspace(self) -> Self {
        self.with_category(Category::Workspace)
    }

    pub fn transient(self) -> Self {
        self.with_category(Category::Transient)
    }

    /// Store the field under a different key in the persisted document.
    pub fn persist_as(mut self, key: impl Into<String>) -> Self {
        self.persist_as = Some(key.into());
        self
    }

    /// Reject values `check` returns false for, after the kind check.
    pub fn validate_with(mut self, check: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.hooks.validator = Some(Arc::new(check));
        self
    }

    /// Store values as `encode` renders them instead of their plain JSON form.
    pub fn serialize_with(
        mut self,
        encode: impl Fn(&Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.hooks.serializer = Some(Arc::new(encode));
        self
    }

    /// Read stored JSON through `decode`. The decoded value is still
    /// validated.
    pub fn deserialize_with(
        mut self,
        decode: impl Fn(&serde_json::Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.deserializer = Some(Arc::new(decode));
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> &FieldKind { &self.kind }
    pub fn default_value(&self) -> &Value { &self.default }
    pub fn description(&self) -> &str { &self.description }
    pub fn category(&self) -> Category { self.category }

    /// Key used in persisted documents.
    pub fn persist_key(&self) -> &str {
        self.persist_as.as_deref().unwrap_or(&self.name)
    }

    pub fn is_persisted(&self) -> bool {
        self.category != Category::Transient
    }

    /// Case-insensitive match of `needle` against name and description.
    /// An empty needle matches every field.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Check `candidate` against this field and return the normalized value.
    pub fn validate(&self, candidate: Value) -> Result<Value, ValidationError> {
        self.check(candidate, true)
    }

    /// Definition-time check of the default. Skips the filesystem check.
    pub(crate) fn check_default(&self) -> Result<Value, ValidationError> {
        self.check(self.default.clone(), false)
    }

    fn check(&self, candidate: Value, check_fs: bool) -> Result<Value, ValidationError> {
        let value = self.check_kind(candidate, check_fs)?;
        match &self.hooks.validator {
            Some(accept) if !accept(&value) => Err(ValidationError::Rejected {
                field: self.name.clone(),
                value: value.to_string(),
            }),
            _ => Ok(value),
        }
    }

    fn check_kind(&self, candidate: Value, check_fs: bool) -> Result<Value, ValidationError> {
        match &self.kind {
            FieldKind::Integer { min, max } => {
                let v = match &candidate {
                    Value::Int(i) => *i,
                    Value::Float(_) => candidate.as_int().ok_or_else(|| self.type_error(&candidate))?,
                    _ => return Err(self.type_error(&candidate)),
                };
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return Err(self.range_error(&candidate, describe_range(*min, *max)));
                }
                Ok(Value::Int(v))
            }
            FieldKind::Float { min, max } => {
                let v = candidate
                    .as_float()
                    .filter(|f| f.is_finite())
                    .ok_or_else(|| self.type_error(&candidate))?;
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return Err(self.range_error(&candidate, describe_range(*min, *max)));
                }
                Ok(Value::Float(v))
            }
            FieldKind::String { max_length } => {
                let text = candidate.as_str().ok_or_else(|| self.type_error(&candidate))?;
                if let Some(limit) = max_length {
                    if text.chars().count() > *limit {
                        return Err(self.range_error(&candidate, format!("at most {limit} characters")));
                    }
                }
                Ok(Value::String(text.to_owned()))
            }
            FieldKind::Path { must_exist } => {
                let path = match candidate {
                    Value::Path(p) => p,
                    Value::String(s) => std::path::PathBuf::from(s),
                    other => return Err(self.type_error(&other)),
                };
                if *must_exist && check_fs && !path.exists() {
                    return Err(ValidationError::PathNotFound { field: self.name.clone(), path });
                }
                Ok(Value::Path(path))
            }
            FieldKind::Boolean => match candidate {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                other => Err(self.type_error(&other)),
            },
            FieldKind::Choice { choices } => {
                match choices.iter().find(|c| c.loosely_equals(&candidate)) {
                    Some(allowed) => Ok(allowed.clone()),
                    None => Err(ValidationError::InvalidChoice {
                        field: self.name.clone(),
                        value: candidate.to_string(),
                        choices: format!(
                            "[{}]",
                            choices.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                        ),
                    }),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Document form
    // ------------------------------------------------------------------------

    /// JSON stored in a document for `value`.
    pub fn encode(&self, value: &Value) -> serde_json::Value {
        match &self.hooks.serializer {
            Some(encode) => encode(value),
            None => value.to_json(),
        }
    }

    /// Candidate value read back from stored JSON. Not yet validated.
    pub fn decode(&self, json: &serde_json::Value) -> Result<Value, ValidationError> {
        let decoded = match &self.hooks.deserializer {
            Some(decode) => decode(json).ok_or("UNDECODABLE"),
            None => Value::from_json(json),
        };
        decoded.map_err(|got| ValidationError::Type {
            field: self.name.clone(),
            expected: self.kind.name().to_string(),
            got: got.to_string(),
        })
    }

    fn type_error(&self, got: &Value) -> ValidationError {
        ValidationError::Type {
            field: self.name.clone(),
            expected: self.kind.name().to_string(),
            got: got.type_name().to_string(),
        }
    }

    fn range_error(&self, value: &Value, range: String) -> ValidationError {
        ValidationError::Range {
            field: self.name.clone(),
            value: value.to_string(),
            range,
        }
    }
}

fn describe_range<T: fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{lo}, {hi}]"),
        (Some(lo), None) => format!("[{lo}, ∞)"),
        (None, Some(hi)) => format!("(-∞, {hi}]"),
        (None, None) => "(-∞, ∞)".to_string(),
    }
}
