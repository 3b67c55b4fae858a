//! # Resource Trait
//!
//! The `Resource` trait is the capability set every resource instance offers to the
//! [`Runtime`]. The runtime never knows concrete resource types; it only calls through this
//! trait (polymorphism over an interface, not inheritance).
//!
//! # Provided state
//! Implementors embed a [`ResourceBase`], which carries the instance identity and its
//! private field [`Cache`]. Most field computations follow the same shape ("skip if valid,
//! read dependencies, store the value or the error") and can use
//! [`ResourceBase::compute_field`].
//!
//! # Protocol
//! - `register(field)` declares the field's upstream dependencies, typically with
//!   [`Runtime::watch_and_compute`]. Called once, when the first watcher subscribes.
//! - `compute(field)` produces the value and stores it in the cache. It is the only place
//!   where remote I/O happens. Returning [`FactError::NotReady`] means "a dependency is not
//!   valid yet, call me again when it changes".
//! - `field(name)` only reads the cache; it never computes.

use crate::cache::{Cache, CacheEntry};
use crate::error::{FactError, Result};
use crate::registry::{FieldInfo, FieldType, ResourceClass};
use crate::runtime::Runtime;
use crate::value::{ResourceRef, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Shared handle to a live resource instance.
pub type ResourceHandle = Arc<dyn Resource>;

/// Identity of a resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub name: String,
    pub id: String,
}

impl ResourceId {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Process-unique key of this instance.
    pub fn uid(&self) -> String {
        format!("{}\0{}", self.name, self.id)
    }

    /// Process-unique key of one field of this instance.
    pub fn field_uid(&self, field: &str) -> String {
        format!("{}\0{}\0{}", self.name, self.id, field)
    }

    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.name.clone(), self.id.clone())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.id)
        }
    }
}

/// Identity and field cache shared by every resource implementation.
#[derive(Debug)]
pub struct ResourceBase {
    id: ResourceId,
    cache: Cache,
}

impl ResourceBase {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(name, id),
            cache: Cache::new(),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn field_uid(&self, field: &str) -> String {
        self.id.field_uid(field)
    }

    /// Reads a field from the cache (see [`Cache::value`]).
    pub fn value(&self, field: &str) -> Result<Value> {
        self.cache.value(field)
    }

    /// Compute-once helper for a single field.
    ///
    /// Does nothing if the field is already valid. Otherwise runs `f`: a value is stored,
    /// `NotReady` is returned to the caller without touching the cache, and any other error
    /// is stored as the field's value (the field is then valid, but failed).
    pub fn compute_field<F>(&self, field: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<Value>,
    {
        if self.cache.is_valid(field) {
            return Ok(());
        }
        match f() {
            Err(FactError::NotReady) => {
                trace!(resource = %self.id, field, "compute> not ready");
                Err(FactError::NotReady)
            }
            result => {
                trace!(resource = %self.id, field, ok = result.is_ok(), "compute> stored");
                self.cache.store(field, CacheEntry::from_result(result));
                Ok(())
            }
        }
    }

    /// Checks that every mandatory field was supplied at construction.
    pub fn require(&self, fields: &[&str]) -> Result<()> {
        for field in fields {
            if self.cache.load(field).is_none() {
                return Err(FactError::validation(format!(
                    "initialized \"{}\" resource without a \"{field}\", this field is required",
                    self.id.name
                )));
            }
        }
        Ok(())
    }
}

/// Capability set the runtime consumes.
pub trait Resource: Send + Sync + fmt::Debug {
    fn base(&self) -> &ResourceBase;

    fn fields(&self) -> Vec<FieldInfo>;

    fn register(&self, runtime: &Runtime, field: &str) -> Result<()>;

    fn compute(&self, runtime: &Runtime, field: &str) -> Result<()>;

    fn id(&self) -> &ResourceId {
        self.base().id()
    }

    /// Reads a field from the cache: its value, its stored error, `NotReady` while pending,
    /// or `NotFound` for a field this resource does not declare.
    fn field(&self, name: &str) -> Result<Value> {
        if !self.fields().iter().any(|f| f.name == name) {
            return Err(FactError::unknown_field(self.base().name(), name));
        }
        self.base().value(name)
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Resource for classes without a factory: every field is constant and pre-populated.
///
/// Fields take their declared constant; resource-reference fields (such as the `config`
/// field of a materialised `sshd` parent) point at the referenced class; everything else
/// is `Null`.
#[derive(Debug)]
pub struct StaticResource {
    base: ResourceBase,
    fields: Vec<FieldInfo>,
}

impl StaticResource {
    pub fn new(class: &ResourceClass) -> Self {
        let base = ResourceBase::new(class.name.clone(), "");
        let fields: Vec<FieldInfo> = class.fields.values().cloned().collect();
        for field in &fields {
            let value = match (&field.constant, &field.field_type) {
                (Some(value), _) => value.clone(),
                (None, FieldType::Resource(target)) => Value::Resource(ResourceRef::new(target.clone(), "")),
                (None, _) => Value::Null,
            };
            base.cache().store_value(field.name.clone(), value);
        }
        Self { base, fields }
    }
}

impl Resource for StaticResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn fields(&self) -> Vec<FieldInfo> {
        self.fields.clone()
    }

    fn register(&self, _runtime: &Runtime, field: &str) -> Result<()> {
        self.field(field).map(|_| ())
    }

    fn compute(&self, _runtime: &Runtime, field: &str) -> Result<()> {
        self.field(field).map(|_| ())
    }
}
