//! # factgraph
//!
//! Command-line front end for the `factgraph-core` runtime and the `factgraph-os` resource
//! pack. It answers queries such as `platform.name` or `sshd.config.params` about the local
//! machine, or about a JSON fixture (`--mock`), and prints the results as JSON.
//!
//! ```bash
//! factgraph platform.name kernel.version 'file(path=/etc/hosts).exists'
//! factgraph --mock host.json sshd.config.params
//! factgraph --schema
//! RUST_LOG=factgraph_core=debug factgraph users.list
//! ```
//!
//! ## Module Tour
//!
//! - [`cli`]: argument parsing with `clap`.
//! - [`query`]: the `resource[(key=value, ...)].field` grammar.
//! - [`config`]: JSON fixtures that script a mock provider.
//! - [`lifecycle`]: the [`Session`](lifecycle::Session) that wires registry, provider and
//!   runtime together and evaluates queries concurrently.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod query;
