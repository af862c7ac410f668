//! # Model Registry
//!
//! Turns a model class's field declarations into an ordered, cached
//! `Catalogue`.
//!
//! A model class is any type implementing [`ModelClass`]. Its `declare`
//! function is the class body: it registers the fields that class adds or
//! redeclares. Base classes are named through the `Base` associated type,
//! with `()` as the root.
//!
//! ## Lifecycle
//!
//! The class → catalogue table is process-wide. It is filled lazily the first
//! time a class is asked for and is only emptied by process exit or an
//! explicit [`clear`] (meant for test harnesses). Failed builds are not cached.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::model::{Category, FieldDescriptor};
use crate::{Error, Result};

// ============================================================================
// ModelClass
// ============================================================================

/// A model definition whose fields are declared once per type.
pub trait ModelClass: 'static {
    /// Class name, used in error messages and logs.
    const NAME: &'static str;

    /// Parent model class. Use `()` for a root class.
    type Base: ModelClass;

    /// Register this class body's fields, in declaration order.
    fn declare(body: &mut ClassBody);
}

/// The root of every lineage. Declares nothing.
impl ModelClass for () {
    const NAME: &'static str = "()";
    type Base = ();

    fn declare(_body: &mut ClassBody) {}
}

/// Field declarations of a single class body.
#[derive(Debug, Clone)]
pub struct ClassBody {
    class: String,
    fields: Vec<FieldDescriptor>,
}

impl ClassBody {
    pub fn new(class: impl Into<String>) -> Self {
        Self { class: class.into(), fields: Vec::new() }
    }

    /// Declare a field. Declaring the same name twice in one body is
    /// reported when the catalogue is built.
    pub fn field(&mut self, descriptor: FieldDescriptor) -> &mut Self {
        self.fields.push(descriptor);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

// ============================================================================
// Catalogue
// ============================================================================

/// Ordered field descriptors of one model class, inherited ones included.
#[derive(Debug, Clone)]
pub struct Catalogue {
    class: String,
    /// Class names base-to-derived.
    lineage: SmallVec<[String; 4]>,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalogue {
    /// Build a catalogue from class bodies ordered base-to-derived.
    ///
    /// A name redeclared by a later body replaces the earlier descriptor in
    /// its original position. Every default is checked against its field's
    /// constraints.
    pub fn from_bodies(bodies: impl IntoIterator<Item = ClassBody>) -> Result<Self> {
        let mut lineage: SmallVec<[String; 4]> = SmallVec::new();
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for body in bodies {
            {
                let mut seen: HashSet<&str> = HashSet::with_capacity(body.fields.len());
                for field in &body.fields {
                    if !seen.insert(field.name()) {
                        return Err(Error::DuplicateField {
                            class: body.class.clone(),
                            field: field.name().to_string(),
                        });
                    }
                    if let Err(source) = field.check_default() {
                        return Err(Error::InvalidDefault {
                            class: body.class.clone(),
                            field: field.name().to_string(),
                            source,
                        });
                    }
                }
            }

            for field in body.fields {
                let existing = index.get(field.name()).copied();
                match existing {
                    Some(pos) => fields[pos] = field,
                    None => {
                        index.insert(field.name().to_string(), fields.len());
                        fields.push(field);
                    }
                }
            }
            lineage.push(body.class);
        }

        let class = lineage.last().cloned().unwrap_or_default();
        check_persist_keys(&class, &fields)?;
        Ok(Self { class, lineage, fields, index })
    }

    /// Single-body catalogue, for models assembled at runtime.
    pub fn from_fields(class: impl Into<String>, fields: impl IntoIterator<Item = FieldDescriptor>) -> Result<Self> {
        let mut body = ClassBody::new(class);
        for field in fields {
            body.field(field);
        }
        Self::from_bodies([body])
    }

    /// Name of the most-derived class.
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Class names base-to-derived.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name())
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(move |f| f.category() == category)
    }

    /// Field of `category` stored under `key` in a persisted document.
    pub fn by_persist_key(&self, category: Category, key: &str) -> Option<&FieldDescriptor> {
        self.in_category(category).find(|f| f.persist_key() == key)
    }

    /// Fields whose name or description contains `text`, ignoring case.
    pub fn search(&self, text: &str) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.matches(text)).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalogue {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Two persisted fields of one category must not share a document key.
fn check_persist_keys(class: &str, fields: &[FieldDescriptor]) -> Result<()> {
    let mut owners: HashMap<(Category, &str), &str> = HashMap::with_capacity(fields.len());
    for field in fields.iter().filter(|f| f.is_persisted()) {
        if let Some(first) = owners.insert((field.category(), field.persist_key()), field.name()) {
            return Err(Error::PersistKeyCollision {
                class: class.to_string(),
                key: field.persist_key().to_string(),
                first: first.to_string(),
                second: field.name().to_string(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Process-wide table
// ============================================================================

static REGISTRY: OnceLock<RwLock<HashMap<TypeId, Arc<Catalogue>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<TypeId, Arc<Catalogue>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// The catalogue of `C`, built on first use and shared afterwards.
pub fn catalogue_for<C: ModelClass>() -> Result<Arc<Catalogue>> {
    let key = TypeId::of::<C>();
    if let Some(found) = registry().read().get(&key) {
        return Ok(Arc::clone(found));
    }

    let mut bodies = Vec::new();
    let mut visited = Vec::new();
    collect_lineage::<C>(&mut bodies, &mut visited)?;
    let built = Arc::new(Catalogue::from_bodies(bodies)?);
    tracing::debug!(class = C::NAME, fields = built.len(), "built model catalogue");

    // Another caller may have built it meanwhile; keep whichever landed first.
    let mut table = registry().write();
    Ok(Arc::clone(table.entry(key).or_insert(built)))
}

/// Drop every cached catalogue. Instances keep the catalogues they hold.
pub fn clear() {
    registry().write().clear();
}

/// Number of classes with a cached catalogue.
pub fn cached_classes() -> usize {
    registry().read().len()
}

fn collect_lineage<C: ModelClass>(bodies: &mut Vec<ClassBody>, visited: &mut Vec<TypeId>) -> Result<()> {
    let id = TypeId::of::<C>();
    if id == TypeId::of::<()>() {
        return Ok(());
    }
    if visited.contains(&id) {
        return Err(Error::InheritanceCycle { class: C::NAME.to_string() });
    }
    visited.push(id);
    collect_lineage::<C::Base>(bodies, visited)?;

    let mut body = ClassBody::new(C::NAME);
    C::declare(&mut body);
    bodies.push(body);
    Ok(())
}
