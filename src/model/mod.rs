//! # Field Model
//!
//! Field descriptors, their values, and the live instances that hold them.
//!
//! Design rule: nothing in here touches a persisted document. Instances know
//! which scope a field belongs to and whether that scope is dirty; reading
//! and writing documents is the persistence manager's job.

pub mod value;
pub mod field;
pub mod observer;
pub mod instance;

pub use value::Value;
pub use field::{FieldDescriptor, FieldKind, Category, Scope, ValidationError, Validator, Serializer, Deserializer};
pub use observer::{FieldChange, ObserverId, ObserverFailure, BoxError, Observer};
pub use instance::{ModelInstance, FieldMap, DocState, RestoreReport};
