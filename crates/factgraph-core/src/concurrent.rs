//! # Concurrent Map
//!
//! A thin `Store/Load/Delete/Range` facade over [`DashMap`], shared by every concurrent
//! index in the runtime: resource classes, resource instances, both directions of the
//! observer graph, and each per-resource field cache.
//!
//! `DashMap` shards its locks, so unrelated keys never contend on a single global lock.
//! Closures passed to [`ConcurrentMap::upsert`], [`ConcurrentMap::update`],
//! [`ConcurrentMap::remove_if`] and [`ConcurrentMap::range`] run while a shard lock is held
//! and must not touch the same map again.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

pub struct ConcurrentMap<K, V> {
    inner: DashMap<K, V>,
}

impl<K: Eq + Hash, V> ConcurrentMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Stores a value, returning the previous one.
    pub fn store(&self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Returns a clone of the value stored under `key`.
    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.get(key).map(|v| v.value().clone())
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(key)
    }

    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove(key).map(|(_, v)| v)
    }

    /// Atomically loads the existing value or stores `value`.
    ///
    /// Returns the value now in the map and `true` if it was already present.
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool)
    where
        V: Clone,
    {
        match self.inner.entry(key) {
            Entry::Occupied(e) => (e.get().clone(), true),
            Entry::Vacant(e) => (e.insert(value).value().clone(), false),
        }
    }

    /// Atomically mutates the value under `key`, inserting `default()` first if absent.
    ///
    /// Returns the closure's result and `true` if the entry was created by this call.
    pub fn upsert<R>(
        &self,
        key: K,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> (R, bool) {
        match self.inner.entry(key) {
            Entry::Occupied(mut e) => (f(e.get_mut()), false),
            Entry::Vacant(e) => {
                let mut slot = e.insert(default());
                (f(slot.value_mut()), true)
            }
        }
    }

    /// Atomically mutates an existing value. Returns `None` if `key` is absent.
    pub fn update<Q, R>(&self, key: &Q, f: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get_mut(key).map(|mut v| f(v.value_mut()))
    }

    /// Removes the entry if `predicate` holds for it.
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .remove_if(key, |_, v| predicate(v))
            .map(|(_, v)| v)
    }

    /// Visits every entry until `f` returns `false`.
    pub fn range(&self, mut f: impl FnMut(&K, &V) -> bool) {
        for entry in self.inner.iter() {
            if !f(entry.key(), entry.value()) {
                break;
            }
        }
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow copy: a new top-level map holding clones of the stored values.
impl<K: Eq + Hash + Clone, V: Clone> Clone for ConcurrentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Eq + Hash + fmt::Debug, V: fmt::Debug> fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for e in self.inner.iter() {
            map.entry(e.key(), e.value());
        }
        map.finish()
    }
}
