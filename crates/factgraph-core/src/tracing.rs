//! # Observability & Tracing
//!
//! The runtime logs every protocol step with `tracing`, using structured fields rather than
//! formatted strings:
//!
//! | Step | Level | Fields |
//! |------|-------|--------|
//! | `w+u>` watch and update | debug | `field`, `watcher`, `initial`, `exists` |
//! | `w+c>` watch and compute | debug | `src`, `dst`, `initial`, `exists` |
//! | `trigger>` | trace | `resource`, `field` |
//! | failed compute inside a callback | error | `field`, `error` |
//!
//! Field uids contain NUL separators and are rendered with `/` in log lines.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Protocol steps
//! RUST_LOG=factgraph_core=debug factgraph 'sshd.config.params'
//!
//! # Everything, including cache stores and observer edges
//! RUST_LOG=trace factgraph 'kernel.parameters'
//! ```

use tracing_subscriber::EnvFilter;

/// Installs a compact `fmt` subscriber on stderr, filtered by `RUST_LOG` or, when that is
/// unset, by `default_filter` (e.g. `"warn"`).
///
/// Panics if a global subscriber is already set; use [`try_setup_tracing`] where that can
/// happen (tests, embedding applications).
pub fn setup_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but writes through the test harness and returns `false` instead
/// of panicking when a subscriber is already installed.
pub fn try_setup_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("off"))
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init()
        .is_ok()
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}
