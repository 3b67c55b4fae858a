//! # Observer Graph
//!
//! A bidirectional many-to-many index between field identities and watcher identities.
//!
//! - `forward`: field uid → (watcher uid → callback)
//! - `reverse`: watcher uid → set of field uids it watches
//! - `hooks`: watcher uid → callback run once when the watcher is torn down
//!
//! A watcher is either an external consumer or another field. Edges wired by
//! [`Runtime::watch_and_compute`](crate::Runtime::watch_and_compute) use the downstream
//! field's uid as the watcher id, which is what lets [`Observers::unwatch_all`] cascade:
//! when a field loses its last watcher, the field is itself unwatched from everything it
//! depends on.
//!
//! ## Locking
//! Every index is a [`ConcurrentMap`]. The only nested locking is the release cascade
//! reading `forward` while it holds a `reverse` shard lock; nothing locks the two maps in
//! the opposite order. Callbacks always run after every lock has been released, so a
//! callback may freely re-enter the graph (watch, trigger, unwatch).

use crate::concurrent::ConcurrentMap;
use crate::error::{FactError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Zero-argument notification registered for a (field, watcher) pair.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Result of [`Observers::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOutcome {
    /// First watcher ever subscribed to this field; the caller must bootstrap it.
    pub initial: bool,
    /// This exact (field, watcher) pair was already registered; its callback was replaced.
    pub existed: bool,
}

#[derive(Default)]
pub struct Observers {
    forward: ConcurrentMap<String, HashMap<String, Callback>>,
    reverse: ConcurrentMap<String, HashSet<String>>,
    hooks: ConcurrentMap<String, Callback>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `watcher` to `field`.
    pub fn watch(&self, field: &str, watcher: &str, callback: Callback) -> Result<WatchOutcome> {
        if watcher.is_empty() {
            return Err(FactError::validation("cannot watch a field with an empty watcher id"));
        }
        if field.is_empty() {
            return Err(FactError::validation("cannot watch an empty field id"));
        }

        let (existed, initial) = self.forward.upsert(field.to_string(), HashMap::new, |watchers| {
            watchers.insert(watcher.to_string(), callback).is_some()
        });
        self.reverse.upsert(watcher.to_string(), HashSet::new, |fields| {
            fields.insert(field.to_string())
        });

        trace!(field = %printable(field), watcher = %printable(watcher), initial, existed, "watch");
        Ok(WatchOutcome { initial, existed })
    }

    /// Removes one association. Returns `true` when `field` has no watchers left.
    ///
    /// Unwatching a pair that was never watched is not an error.
    pub fn unwatch(&self, field: &str, watcher: &str) -> Result<bool> {
        if watcher.is_empty() {
            return Err(FactError::validation("cannot unwatch a field with an empty watcher id"));
        }

        let now_empty = self.detach_forward(field, watcher);

        if let Some(true) = self.reverse.update(watcher, |fields| {
            fields.remove(field);
            fields.is_empty()
        }) {
            self.reverse.remove_if(watcher, HashSet::is_empty);
        }

        trace!(field = %printable(field), watcher = %printable(watcher), now_empty, "unwatch");
        Ok(now_empty)
    }

    /// Registers a hook that runs once, the next time `watcher` is torn down by
    /// [`Observers::unwatch_all`]. A second registration replaces the first.
    pub fn set_unwatch_hook(&self, watcher: &str, hook: Callback) -> Result<()> {
        if watcher.is_empty() {
            return Err(FactError::validation("cannot set an unwatch hook for an empty watcher id"));
        }
        self.hooks.store(watcher.to_string(), hook);
        Ok(())
    }

    /// Removes every association of `watcher`, cascading through fields that lose their
    /// last watcher as a result.
    ///
    /// Walks an explicit worklist with a visited set, so it terminates even if the
    /// dependency edges happen to form a cycle.
    pub fn unwatch_all(&self, watcher: &str) -> Result<()> {
        if watcher.is_empty() {
            return Err(FactError::validation("cannot unwatch an empty watcher id"));
        }
        self.release(watcher, false);
        Ok(())
    }

    /// Releases the dependencies of `field` if nobody watches it, cascading like
    /// [`Observers::unwatch_all`]. A watched field is left untouched.
    pub fn release_unwatched(&self, field: &str) -> Result<()> {
        if field.is_empty() {
            return Err(FactError::validation("cannot release an empty field id"));
        }
        self.release(field, true);
        Ok(())
    }

    /// Cascade shared by [`Observers::unwatch_all`] and [`Observers::release_unwatched`].
    ///
    /// Entries marked `guarded` are fields queued because they lost their last watcher. A
    /// concurrent subscription may watch such a field again and wire fresh edges for it
    /// before the cascade reaches it, so its edges are only released while `forward` has
    /// no entry for it.
    fn release(&self, start: &str, guard_start: bool) {
        let mut worklist = vec![(start.to_string(), guard_start)];
        let mut visited = HashSet::new();

        while let Some((current, guarded)) = worklist.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if guarded && self.forward.contains_key(&current) {
                trace!(field = %printable(&current), "field is watched again, keeping its dependencies");
                continue;
            }

            if let Some(hook) = self.hooks.delete(&current) {
                trace!(watcher = %printable(&current), "unwatch hook");
                hook();
            }

            let removed = if guarded {
                self.reverse
                    .remove_if(&current, |_| !self.forward.contains_key(&current))
            } else {
                self.reverse.delete(&current)
            };
            let Some(fields) = removed else {
                continue;
            };

            let mut fields = fields.into_iter();
            while let Some(field) = fields.next() {
                if guarded && self.forward.contains_key(&current) {
                    let rest: Vec<String> = std::iter::once(field).chain(fields.by_ref()).collect();
                    debug!(field = %printable(&current), kept = rest.len(), "field was watched again while releasing it");
                    self.reverse
                        .upsert(current.clone(), HashSet::new, |set| set.extend(rest));
                    break;
                }
                if self.detach_forward(&field, &current) {
                    debug!(field = %printable(&field), "field has no watchers left, releasing its dependencies");
                    worklist.push((field, true));
                }
            }
        }
    }

    /// Invokes every callback registered for `field`, in unspecified order.
    ///
    /// Fails with `NotFound` if nobody watches the field.
    pub fn trigger(&self, field: &str) -> Result<()> {
        let callbacks: Vec<Callback> = self
            .forward
            .load(field)
            .map(|watchers| watchers.into_values().collect())
            .unwrap_or_default();
        if callbacks.is_empty() {
            return Err(FactError::not_found(format!(
                "cannot trigger field '{}', it has no watchers",
                printable(field)
            )));
        }

        trace!(field = %printable(field), watchers = callbacks.len(), "trigger");
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    /// Watchers of `field`, sorted.
    pub fn watchers(&self, field: &str) -> Vec<String> {
        let mut watchers: Vec<String> = self
            .forward
            .load(field)
            .map(|w| w.into_keys().collect())
            .unwrap_or_default();
        watchers.sort();
        watchers
    }

    /// Fields watched by `watcher`, sorted.
    pub fn watched_by(&self, watcher: &str) -> Vec<String> {
        let mut fields: Vec<String> = self
            .reverse
            .load(watcher)
            .map(|f| f.into_iter().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }

    pub fn field_count(&self) -> usize {
        self.forward.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }

    /// Drops `watcher` from the forward index of `field` and removes the field entry once
    /// empty. Returns `true` if the field has no watchers left.
    fn detach_forward(&self, field: &str, watcher: &str) -> bool {
        match self.forward.update(field, |watchers| {
            watchers.remove(watcher);
            watchers.is_empty()
        }) {
            None => true,
            Some(false) => false,
            Some(true) => {
                self.forward.remove_if(field, HashMap::is_empty);
                true
            }
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("fields", &self.forward.len())
            .field("watchers", &self.reverse.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Field uids use NUL separators; render them readably in logs and messages.
fn printable(uid: &str) -> String {
    uid.replace('\0', "/")
}
