//! # Field Values & Named Arguments
//!
//! Field values are a closed set of variants so consumers pattern-match instead of
//! down-casting. Resource constructors take named arguments ([`Args`]), which can also be
//! built from the flat `(key, value, key, value, ...)` convention via [`Args::from_pairs`].

use crate::error::{FactError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Argument key used to force the instance id of a resource created through a factory.
pub const ID_ARG: &str = "__id";

/// Reference to a resource instance, by class name and instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceRef {
    pub name: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} id = {}", self.name, self.id)
        }
    }
}

/// The value of a computed field.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Resource(ResourceRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Resource(_) => "resource",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceRef> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// Like [`Value::as_str`], but reports a validation error naming `what`.
    pub fn expect_str(&self, what: &str) -> Result<&str> {
        self.as_str().ok_or_else(|| {
            FactError::validation(format!(
                "{what} has the wrong type (expected string, got {})",
                self.type_name()
            ))
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ResourceRef> for Value {
    fn from(v: ResourceRef) -> Self {
        Value::Resource(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(v: BTreeMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Named constructor arguments for a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(BTreeMap<String, Value>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builds arguments from a flat `(key, value, key, value, ...)` list.
    ///
    /// Fails on an odd number of items, a non-string key or an empty key.
    pub fn from_pairs(pairs: Vec<Value>) -> Result<Self> {
        if pairs.len() % 2 == 1 {
            return Err(FactError::validation(
                "named arguments must be supplied as (key, value, ...) pairs, a value is missing",
            ));
        }

        let mut args = Self::new();
        let mut iter = pairs.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let key = match key {
                Value::String(k) if !k.is_empty() => k,
                Value::String(_) => {
                    return Err(FactError::validation("named argument with an empty key"))
                }
                other => {
                    return Err(FactError::validation(format!(
                        "named argument key is not a string: {other:?}"
                    )))
                }
            };
            args.0.insert(key, value);
        }
        Ok(args)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Removes and returns the forced instance id, if any.
    pub fn take_id(&mut self) -> Result<Option<String>> {
        match self.0.remove(ID_ARG) {
            None => Ok(None),
            Some(Value::String(id)) => Ok(Some(id)),
            Some(other) => Err(FactError::validation(format!(
                "argument '{ID_ARG}' must be a string, got {}",
                other.type_name()
            ))),
        }
    }

    /// Removes a string argument, failing on a type mismatch.
    pub fn take_str(&mut self, key: &str) -> Result<Option<String>> {
        match self.0.remove(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(FactError::validation(format!(
                "argument '{key}' has the wrong type (expected string, got {})",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for Args {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
