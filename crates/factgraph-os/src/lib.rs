//! # factgraph-os
//!
//! A small operating-system resource pack for the `factgraph-core` runtime, plus a
//! [`LocalProvider`] that inspects the machine the process runs on.
//!
//! ```text
//!   platform.name ──┐
//!   kernel.version ─┼── command(cmd).stdout ──► Provider::run_command
//!   kernel.params ──┘
//!   kernel.modules ─┐
//!   users.list ─────┼── file(path).content ───► Provider::fs
//!   sshd.config ────┘      (content → params)
//! ```
//!
//! Derived resources only read `command` and `file` instances, so every command runs once
//! per runtime and a failure stays local to the fields that depend on it.
//!
//! ```
//! use factgraph_core::{Registry, Runtime, Value};
//! use factgraph_core::mock::MockProvider;
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! factgraph_os::init(&registry).unwrap();
//!
//! let provider = MockProvider::new();
//! provider.expect_command("uname -s").return_ok("Linux\n");
//! let runtime = Runtime::new(registry, Arc::new(provider)).unwrap();
//!
//! let platform = runtime.create_resource("platform", Default::default()).unwrap();
//! let name = runtime.get_field(platform.as_ref(), "name").unwrap();
//! assert_eq!(name, Value::from("Linux"));
//! ```

pub mod local;
pub mod resources;

pub use local::LocalProvider;

use factgraph_core::{Registry, Result};
use tracing::debug;

/// Registers every class of the pack. Fails with `DuplicateName` when called twice on the
/// same registry.
pub fn init(registry: &Registry) -> Result<()> {
    resources::register_all(registry)?;
    debug!(classes = registry.len(), "os resource pack registered");
    Ok(())
}
