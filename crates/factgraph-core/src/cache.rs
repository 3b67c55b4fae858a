//! # Field Cache
//!
//! Every resource instance owns one [`Cache`], keyed by field name. An entry moves through
//! three states:
//!
//! | State | Meaning |
//! |-------|---------|
//! | absent | never computed |
//! | present, `valid == false` | computation in flight or waiting for dependencies |
//! | present, `valid == true` | usable; watchers may be notified |
//!
//! A valid entry may hold an error instead of a value: that is how a failed field reports
//! its failure to whoever reads it, without affecting sibling fields.

use crate::concurrent::ConcurrentMap;
use crate::error::{FactError, Result};
use crate::value::Value;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Option<std::result::Result<Value, FactError>>,
    pub valid: bool,
    pub updated: SystemTime,
}

impl CacheEntry {
    /// Placeholder stored while a field is being computed.
    pub fn pending() -> Self {
        Self {
            value: None,
            valid: false,
            updated: SystemTime::now(),
        }
    }

    pub fn ready(value: Value) -> Self {
        Self {
            value: Some(Ok(value)),
            valid: true,
            updated: SystemTime::now(),
        }
    }

    pub fn failed(err: FactError) -> Self {
        Self {
            value: Some(Err(err)),
            valid: true,
            updated: SystemTime::now(),
        }
    }

    pub fn from_result(result: std::result::Result<Value, FactError>) -> Self {
        match result {
            Ok(v) => Self::ready(v),
            Err(e) => Self::failed(e),
        }
    }

    /// The usable value of a valid entry; `NotReady` for a pending one.
    pub fn result(&self) -> Result<Value> {
        match (&self.value, self.valid) {
            (Some(result), true) => result.clone(),
            (None, true) => Ok(Value::Null),
            (_, false) => Err(FactError::NotReady),
        }
    }
}

#[derive(Debug, Default)]
pub struct Cache {
    entries: ConcurrentMap<String, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, field: &str) -> Option<CacheEntry> {
        self.entries.load(field)
    }

    pub fn store(&self, field: impl Into<String>, entry: CacheEntry) {
        self.entries.store(field.into(), entry);
    }

    pub fn store_value(&self, field: impl Into<String>, value: Value) {
        self.store(field, CacheEntry::ready(value));
    }

    /// Atomically loads the entry for `field` or stores `entry`.
    ///
    /// Returns the entry now in the cache and whether it already existed.
    pub fn load_or_store(&self, field: &str, entry: CacheEntry) -> (CacheEntry, bool) {
        self.entries.load_or_store(field.to_string(), entry)
    }

    pub fn is_valid(&self, field: &str) -> bool {
        self.entries
            .load(field)
            .map(|e| e.valid)
            .unwrap_or(false)
    }

    /// The field's value when valid; `NotReady` when pending or absent.
    pub fn value(&self, field: &str) -> Result<Value> {
        match self.entries.load(field) {
            Some(entry) => entry.result(),
            None => Err(FactError::NotReady),
        }
    }

    /// Drops the entry for `field`, so the next trigger recomputes it.
    pub fn invalidate(&self, field: &str) -> Option<CacheEntry> {
        self.entries.delete(field)
    }

    /// Removes the entry for `field` only while it is still pending.
    pub fn discard_pending(&self, field: &str) -> bool {
        self.entries.remove_if(field, |e| !e.valid).is_some()
    }

    pub fn fields(&self) -> Vec<String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
