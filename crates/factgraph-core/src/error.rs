//! # Runtime Errors
//!
//! This module defines the error taxonomy shared by the registry, the observer graph and
//! the runtime. Callers distinguish kinds through the enum variants (or the `is_*`
//! predicates), never by matching on messages.
//!
//! `NotReady` is not a failure: it signals that a field's dependencies are not satisfied
//! yet and that nothing should be propagated. The runtime swallows it at exactly two call
//! sites (`watch_and_update` and the `watch_and_compute` callback).

use std::sync::Arc;

/// Errors raised by transports that back a [`Provider`](crate::Provider).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("command could not be started: {0}")]
    CommandNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("i/o error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("operation not supported by provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors that can occur within the resource runtime.
///
/// The type is `Clone` because a failed field keeps its error in the cache and hands a
/// copy to every watcher that asks for it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FactError {
    /// Dependencies are not satisfied yet; do not propagate.
    #[error("not ready")]
    NotReady,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("resource name already registered: {0}")]
    DuplicateName(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("failed to compute field '{field}' of resource '{resource}': {source}")]
    Compute {
        resource: String,
        field: String,
        #[source]
        source: Arc<FactError>,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, FactError>;

impl FactError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Unknown field on a resource class.
    pub fn unknown_field(resource: &str, field: &str) -> Self {
        Self::NotFound(format!("cannot find field '{field}' in resource '{resource}'"))
    }

    /// Wraps an error returned by a resource's own `compute`/`register`.
    ///
    /// `NotReady` is passed through untouched and an existing `Compute` error is not
    /// wrapped twice.
    pub fn compute(resource: &str, field: &str, source: FactError) -> Self {
        match source {
            Self::NotReady | Self::Compute { .. } => source,
            other => Self::Compute {
                resource: resource.to_string(),
                field: field.to_string(),
                source: Arc::new(other),
            },
        }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Duplicate names are a flavour of validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::DuplicateName(_))
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_does_not_wrap_not_ready() {
        let err = FactError::compute("file", "content", FactError::NotReady);
        assert!(err.is_not_ready());
    }

    #[test]
    fn compute_keeps_source_chain() {
        let err = FactError::compute(
            "file",
            "content",
            ProviderError::FileNotFound("/etc/shadow".into()).into(),
        );
        assert!(err.is_compute());
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "file not found: /etc/shadow");

        let again = FactError::compute("sshd.config", "content", err.clone());
        assert!(matches!(again, FactError::Compute { ref resource, .. } if resource == "file"));
    }

    #[test]
    fn duplicate_name_is_validation() {
        assert!(FactError::DuplicateName("sshd".into()).is_validation());
        assert!(!FactError::not_found("x").is_validation());
    }
}
