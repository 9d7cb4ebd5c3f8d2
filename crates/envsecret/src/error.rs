use std::path::PathBuf;

use thiserror::Error;

/// Errors a [`SecretFetcher`](crate::SecretFetcher) reports for a single reference
#[derive(Debug, Error)]
pub enum SecretError {
    /// Reference is not in a form the fetcher understands
    #[error("Invalid secret reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Secret not found in backend
    #[error("Secret not found: {0}")]
    NotFound(String),

    /// Permission/access denied
    #[error("Access denied to secret: {0}")]
    AccessDenied(String),

    /// Backend runtime error
    #[error("{backend} error: {message}")]
    BackendError { backend: String, message: String },

    /// File IO error
    #[error("Failed to read file '{path}': {message}")]
    FileError { path: PathBuf, message: String },

    /// Fetched value cannot be used as an environment variable value
    #[error("Invalid secret value: {0}")]
    InvalidValue(String),

    /// Key cannot be written to the environment
    #[error("Invalid environment variable name {0:?}")]
    InvalidKey(String),

    /// The resolution context was cancelled
    #[error("Resolution cancelled")]
    Cancelled,

    /// The resolution context deadline passed
    #[error("Resolution deadline exceeded")]
    DeadlineExceeded,
}

impl SecretError {
    /// Create an invalid reference error
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendError {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the context rather than the backend
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// A secret reference held by `key` could not be materialized.
///
/// Aborts the resolution pass. Variables rewritten earlier in the same pass
/// keep their resolved values.
#[derive(Debug, Error)]
#[error("failed to resolve {key:?}: {source}")]
pub struct ResolutionError {
    key: String,
    #[source]
    source: SecretError,
}

impl ResolutionError {
    pub fn new(key: impl Into<String>, source: SecretError) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }

    /// Environment variable whose reference failed
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Underlying fetch failure
    pub fn secret_error(&self) -> &SecretError {
        &self.source
    }

    pub fn into_secret_error(self) -> SecretError {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_resolution_error_names_key_and_cause() {
        let err = ResolutionError::new("DB_PASSWORD", SecretError::NotFound("db".to_string()));
        assert_eq!(err.key(), "DB_PASSWORD");
        assert_eq!(
            err.to_string(),
            "failed to resolve \"DB_PASSWORD\": Secret not found: db"
        );

        let source = err.source().expect("cause must be attached");
        assert_eq!(source.to_string(), "Secret not found: db");
    }

    #[test]
    fn test_interrupted_errors() {
        assert!(SecretError::Cancelled.is_interrupted());
        assert!(SecretError::DeadlineExceeded.is_interrupted());
        assert!(!SecretError::backend("gcp", "boom").is_interrupted());
    }
}
