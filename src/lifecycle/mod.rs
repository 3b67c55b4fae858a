//! Session orchestration for the CLI.
//!
//! - [`Session`] - builds the registry and runtime, evaluates queries and reports leaks at
//!   shutdown
//! - [`Outcome`] - the JSON shape of a single query result

pub mod session;

pub use session::*;
