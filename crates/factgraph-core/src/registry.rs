//! # Schema Registry
//!
//! The static catalog of resource classes: their fields, their factories and their
//! visibility. The registry is loaded once at start-up and read concurrently afterwards.
//!
//! ## Dotted names
//!
//! Registering `sshd.config` implies a resource `sshd` with a field `config` that refers to
//! the child class. Missing ancestors are materialised as *synthetic* static classes; existing
//! ones gain the reference field. Visibility flows upwards: a public descendant makes every
//! ancestor public, even one that was registered as private.
//!
//! ## Copy-on-write classes
//!
//! Classes are stored behind `Arc` and never mutated in place. Augmenting an ancestor
//! replaces its `Arc` with an updated copy, which is what lets [`Registry::clone`] hand out a
//! shallow copy that can evolve without touching the original.

use crate::concurrent::ConcurrentMap;
use crate::error::{FactError, Result};
use crate::resource::ResourceHandle;
use crate::runtime::Runtime;
use crate::value::{Args, Value};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Builds a resource instance from named arguments.
pub type Factory = Arc<dyn Fn(&Runtime, Args) -> Result<ResourceHandle> + Send + Sync>;

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Any,
    Bool,
    Int,
    String,
    List(Box<FieldType>),
    Map(Box<FieldType>),
    /// Reference to an instance of the named resource class.
    Resource(String),
}

impl FieldType {
    pub fn list(of: FieldType) -> Self {
        FieldType::List(Box::new(of))
    }

    pub fn map(of: FieldType) -> Self {
        FieldType::Map(Box::new(of))
    }

    pub fn resource(name: impl Into<String>) -> Self {
        FieldType::Resource(name.into())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::String => write!(f, "string"),
            FieldType::List(t) => write!(f, "[]{t}"),
            FieldType::Map(t) => write!(f, "map[string]{t}"),
            FieldType::Resource(name) => write!(f, "resource({name})"),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A field declaration, scoped to one resource class.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: FieldType,
    /// Must be supplied when the resource is constructed.
    pub mandatory: bool,
    /// Other fields (`field` or `resource.field`) this one is computed from.
    pub refs: Vec<String>,
    pub private: bool,
    /// Value of the field on a static (factory-less) resource.
    pub constant: Option<Value>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mandatory: false,
            refs: Vec::new(),
            private: false,
            constant: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn constant(mut self, value: impl Into<Value>) -> Self {
        self.constant = Some(value.into());
        self
    }
}

/// A named resource class.
#[derive(Clone)]
pub struct ResourceClass {
    pub name: String,
    pub fields: BTreeMap<String, FieldInfo>,
    pub factory: Option<Factory>,
    pub private: bool,
    /// Set when another class's name is an alias for this one.
    pub alias_of: Option<String>,
    synthetic: bool,
}

impl ResourceClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            factory: None,
            private: false,
            alias_of: None,
            synthetic: false,
        }
    }

    fn synthetic(name: &str, private: bool) -> Self {
        Self {
            private,
            synthetic: true,
            ..Self::new(name)
        }
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Runtime, Args) -> Result<ResourceHandle> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// A class without a factory is served by a static resource.
    pub fn is_static(&self) -> bool {
        self.factory.is_none() && self.alias_of.is_none()
    }

    /// True for ancestors materialised from a dotted child name.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn field_info(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }
}

impl fmt::Debug for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClass")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("factory", &self.factory.is_some())
            .field("private", &self.private)
            .field("alias_of", &self.alias_of)
            .field("synthetic", &self.synthetic)
            .finish()
    }
}

/// Public metadata of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mandatory: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    pub private: bool,
}

/// Public metadata of one resource class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSchema {
    pub fields: BTreeMap<String, FieldSchema>,
    pub private: bool,
    #[serde(rename = "static")]
    pub is_static: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
}

pub type Schema = BTreeMap<String, ResourceSchema>;

/// Catalog of resource classes.
///
/// `clone()` is shallow: the copy has its own top-level map but shares class objects with
/// the original until either side replaces them.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    resources: ConcurrentMap<String, Arc<ResourceClass>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class and materialises or augments its ancestors.
    pub fn add(&self, class: ResourceClass) -> Result<()> {
        validate_name(&class.name)?;
        let name = class.name.clone();
        let private = class.private;
        let class = Arc::new(class);

        let (_, existed) = self.resources.load_or_store(name.clone(), class.clone());
        if existed {
            self.resources
                .update(&name, |slot| {
                    if !slot.synthetic {
                        return Err(FactError::DuplicateName(name.clone()));
                    }
                    *slot = Arc::new(merge_synthetic(slot, &class));
                    Ok(())
                })
                .unwrap_or_else(|| Err(FactError::DuplicateName(name.clone())))?;
            debug!(resource = %name, "merged resource into synthetic class");
        } else {
            trace!(resource = %name, "added resource class");
        }

        self.materialize_ancestors(&name, private);
        Ok(())
    }

    /// Attaches a factory to an already registered class.
    pub fn add_factory<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Runtime, Args) -> Result<ResourceHandle> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(factory);
        self.resources
            .update(name, |slot| {
                if slot.factory.is_some() {
                    return Err(FactError::DuplicateName(format!("factory for '{name}'")));
                }
                let mut class = (**slot).clone();
                class.factory = Some(factory);
                class.synthetic = false;
                *slot = Arc::new(class);
                Ok(())
            })
            .unwrap_or_else(|| Err(FactError::not_found(format!("resource '{name}'"))))
    }

    /// Registers `alias` as another name for `target`. A dotted alias materialises its
    /// ancestors the same way [`Registry::add`] does.
    pub fn add_alias(&self, alias: &str, target: &str) -> Result<()> {
        let target_class = self.class(target)?;
        validate_name(alias)?;
        let class = ResourceClass {
            name: alias.to_string(),
            fields: target_class.fields.clone(),
            factory: None,
            private: target_class.private,
            alias_of: Some(target.to_string()),
            synthetic: false,
        };
        let (_, existed) = self
            .resources
            .load_or_store(alias.to_string(), Arc::new(class));
        if existed {
            return Err(FactError::DuplicateName(alias.to_string()));
        }
        self.materialize_ancestors(alias, target_class.private);
        Ok(())
    }

    /// The class registered under exactly `name`.
    pub fn class(&self, name: &str) -> Result<Arc<ResourceClass>> {
        self.resources
            .load(name)
            .ok_or_else(|| FactError::not_found(format!("cannot find resource '{name}'")))
    }

    /// Follows aliases from `name` to the class that implements it.
    pub fn resolve(&self, name: &str) -> Result<Arc<ResourceClass>> {
        let mut seen = HashSet::new();
        let mut class = self.class(name)?;
        while let Some(target) = class.alias_of.clone() {
            if !seen.insert(target.clone()) {
                return Err(FactError::validation(format!(
                    "alias cycle while resolving resource '{name}'"
                )));
            }
            class = self.class(&target)?;
        }
        Ok(class)
    }

    pub fn fields(&self, name: &str) -> Result<BTreeMap<String, FieldInfo>> {
        Ok(self.class(name)?.fields.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ResourceClass>> {
        self.resources.delete(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.resources.keys();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Exports public metadata for every class (factories omitted).
    pub fn schema(&self, include_private: bool) -> Schema {
        let mut schema = Schema::new();
        self.resources.range(|name, class| {
            if class.private && !include_private {
                return true;
            }
            let fields = class
                .fields
                .values()
                .filter(|f| include_private || !f.private)
                .map(|f| {
                    (
                        f.name.clone(),
                        FieldSchema {
                            field_type: f.field_type.clone(),
                            mandatory: f.mandatory,
                            refs: f.refs.clone(),
                            private: f.private,
                        },
                    )
                })
                .collect();
            schema.insert(
                name.clone(),
                ResourceSchema {
                    fields,
                    private: class.private,
                    is_static: class.is_static(),
                    alias_of: class.alias_of.clone(),
                },
            );
            true
        });
        schema
    }

    fn materialize_ancestors(&self, name: &str, private: bool) {
        let mut child = name;
        while let Some((parent, leaf)) = child.rsplit_once('.') {
            let reference = FieldInfo {
                private,
                ..FieldInfo::new(leaf, FieldType::resource(child))
            };
            let (_, created) = self.resources.upsert(
                parent.to_string(),
                || Arc::new(ResourceClass::synthetic(parent, private)),
                |slot| {
                    let missing = !slot.fields.contains_key(leaf);
                    let hidden = !private
                        && (slot.private || slot.fields.get(leaf).is_some_and(|f| f.private));
                    if missing || hidden {
                        let mut class = (**slot).clone();
                        if !private {
                            class.private = false;
                        }
                        class
                            .fields
                            .entry(leaf.to_string())
                            .and_modify(|f| f.private = f.private && private)
                            .or_insert(reference);
                        *slot = Arc::new(class);
                    }
                },
            );
            if created {
                debug!(resource = %parent, child = %child, "materialized parent resource");
            }
            child = parent;
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FactError::validation("resource name must not be empty"));
    }
    if name.split('.').any(str::is_empty) {
        return Err(FactError::validation(format!(
            "resource name '{name}' has an empty segment"
        )));
    }
    Ok(())
}

fn merge_synthetic(existing: &ResourceClass, class: &ResourceClass) -> ResourceClass {
    let mut merged = class.clone();
    for (name, field) in &existing.fields {
        merged
            .fields
            .entry(name.clone())
            .or_insert_with(|| field.clone());
    }
    merged.private = class.private && existing.private;
    merged.synthetic = false;
    merged
}
