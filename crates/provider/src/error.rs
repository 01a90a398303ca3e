//! Provider error taxonomy
//!
//! Provider failures are scoped to one operation and its dependents, never
//! the whole run. The retryable/fatal split drives the executor's backoff.

use thiserror::Error;

/// Errors crossing the provider boundary
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transient failure worth retrying (rate limit, flaky network)
    #[error("transient provider failure: {0}")]
    Retryable(String),

    /// Argument rejected by the provider's schema
    #[error("invalid argument for {resource_type}: {message}")]
    InvalidArgument {
        resource_type: String,
        message: String,
    },

    /// Caller lacks permission; retrying cannot help
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No provider or data source registered for a type
    #[error("no provider registered for type `{0}`")]
    UnknownType(String),

    /// An identified resource no longer exists provider-side
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Secret could not be fetched
    #[error("secret `{name}` (version {version}) unavailable: {message}")]
    SecretUnavailable {
        name: String,
        version: String,
        message: String,
    },

    /// Any other unrecoverable failure
    #[error("{0}")]
    Fatal(String),
}

impl ProviderError {
    /// Whether the executor should retry this operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Classify an IO error: interruptions and timeouts are transient
    pub fn from_io(err: &std::io::Error, what: &str) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                Self::Retryable(format!("{what}: {err}"))
            }
            ErrorKind::PermissionDenied => Self::PermissionDenied(format!("{what}: {err}")),
            _ => Self::Fatal(format!("{what}: {err}")),
        }
    }
}

/// Result alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn io_classification() {
        let timeout = IoError::new(ErrorKind::TimedOut, "slow");
        assert!(ProviderError::from_io(&timeout, "read").is_retryable());

        let denied = IoError::new(ErrorKind::PermissionDenied, "no");
        let err = ProviderError::from_io(&denied, "write");
        assert!(!err.is_retryable());
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
    }
}
