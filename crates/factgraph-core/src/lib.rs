//! # factgraph-core
//!
//! A lazy, memoized, dependency-propagating runtime for facts about a target host.
//!
//! Resources (`file`, `sshd.config`, `kernel`, ...) are declared in a [`Registry`]. Each
//! live resource instance owns a per-field [`Cache`], and fields are computed on demand,
//! at most once per runtime, by the resource itself. Fields may derive from fields of other
//! resources; those edges are declared lazily, the first time a field is watched, and form
//! a dataflow graph that the [`Observers`] index tracks in both directions.
//!
//! ## Architecture Overview
//!
//! 1. **Schema layer** ([`Registry`], [`ResourceClass`], [`FieldInfo`]): what resources and
//!    fields exist, and how to build an instance.
//! 2. **Runtime layer** ([`Runtime`]): the instance store plus the watch / compute / trigger
//!    protocol.
//! 3. **Resource layer** ([`Resource`]): per-resource `register` and `compute`, the only
//!    place that talks to the target through a [`Provider`].
//!
//! ## Field lifecycle
//!
//! ```text
//! Absent --trigger--> Pending --compute--> Valid (value or error) --> watchers notified
//!                        |
//!                        +--NotReady--> retried when a dependency is triggered
//! ```
//!
//! There is no path from `Valid` back to `Pending`: observed facts are immutable for the
//! lifetime of a runtime.
//!
//! ## Example
//!
//! ```rust
//! use factgraph_core::{Args, FieldInfo, FieldType, Registry, ResourceClass, Runtime, Value};
//! use factgraph_core::mock::MockProvider;
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! registry
//!     .add(ResourceClass::new("motd").field(FieldInfo::new("text", FieldType::String).constant("hi")))
//!     .unwrap();
//!
//! let runtime = Runtime::builder()
//!     .registry(registry)
//!     .provider(Arc::new(MockProvider::new()))
//!     .build()
//!     .unwrap();
//!
//! let motd = runtime.create_resource("motd", Args::new()).unwrap();
//! runtime
//!     .watch_and_update(motd.as_ref(), "text", "example", |value| {
//!         assert_eq!(value.unwrap(), Value::from("hi"));
//!     })
//!     .unwrap();
//! runtime.unregister("example").unwrap();
//! ```
//!
//! ## Concurrency Model
//!
//! - Every operation runs synchronously on the calling thread; `compute` may block on I/O.
//! - Independent callers may use one runtime concurrently. Every shared index is a sharded
//!   [`ConcurrentMap`]; there is no global lock.
//! - A field is computed exactly once even when triggered concurrently.
//!
//! ## Testing
//!
//! [`mock::MockProvider`] scripts command output and file contents in memory. See the
//! [`mock`] module.

pub mod cache;
pub mod concurrent;
pub mod error;
pub mod mock;
pub mod observers;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod runtime;
pub mod tracing;
pub mod value;

// Re-export core types for convenience
pub use cache::{Cache, CacheEntry};
pub use concurrent::ConcurrentMap;
pub use error::{FactError, ProviderError, Result};
pub use observers::{Callback, Observers, WatchOutcome};
pub use provider::{CommandOutput, FileHandle, FileInfo, FileSystem, Provider};
pub use registry::{
    Factory, FieldInfo, FieldSchema, FieldType, Registry, ResourceClass, ResourceSchema, Schema,
};
pub use resource::{Resource, ResourceBase, ResourceHandle, ResourceId, StaticResource};
pub use runtime::{Runtime, RuntimeBuilder, WeakRuntime};
pub use value::{Args, ResourceRef, Value, ID_ARG};
