// transitive-common/src/error.rs
use std::sync::Arc;

use thiserror::Error;

/// Every failure a resolution can surface.
///
/// The first six variants are the resolution taxonomy callers branch on; the
/// rest are ambient failures (local disk, configuration) that are never
/// retryable. The enum is `Clone` so a single in-flight fetch can hand the
/// same error to every waiter, which is why foreign errors are `Arc`-wrapped.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("Not found in any repository: {coordinate}")]
    NotFound { coordinate: String },

    #[error("Network error while fetching {coordinate}: {message}")]
    Network { coordinate: String, message: String },

    #[error("Corrupt descriptor for {coordinate}: {message}")]
    CorruptDescriptor { coordinate: String, message: String },

    #[error("Dependency cycle detected: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("Version conflict for {key}: {message}")]
    VersionConflict { key: String, message: String },

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Cache Error: {0}")]
    Cache(String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),
}

impl ResolveError {
    pub fn not_found(coordinate: impl ToString) -> Self {
        ResolveError::NotFound {
            coordinate: coordinate.to_string(),
        }
    }

    pub fn network(coordinate: impl ToString, message: impl Into<String>) -> Self {
        ResolveError::Network {
            coordinate: coordinate.to_string(),
            message: message.into(),
        }
    }

    pub fn corrupt(coordinate: impl ToString, message: impl Into<String>) -> Self {
        ResolveError::CorruptDescriptor {
            coordinate: coordinate.to_string(),
            message: message.into(),
        }
    }

    /// Only transport failures are worth retrying from the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Network { .. })
    }

    /// The coordinate the failure is attached to, if any.
    pub fn coordinate(&self) -> Option<&str> {
        match self {
            ResolveError::NotFound { coordinate }
            | ResolveError::Network { coordinate, .. }
            | ResolveError::CorruptDescriptor { coordinate, .. } => Some(coordinate),
            ResolveError::VersionConflict { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        ResolveError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(err: serde_json::Error) -> Self {
        ResolveError::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(ResolveError::network("g:a:1", "timed out").is_retryable());
        assert!(!ResolveError::not_found("g:a:1").is_retryable());
        assert!(!ResolveError::corrupt("g:a:1", "bad xml").is_retryable());
        assert!(!ResolveError::Cancelled.is_retryable());
    }

    #[test]
    fn coordinate_is_attached_to_fetch_failures() {
        let err = ResolveError::not_found("org.example:lib:1.0");
        assert_eq!(err.coordinate(), Some("org.example:lib:1.0"));
        assert_eq!(
            err.to_string(),
            "Not found in any repository: org.example:lib:1.0"
        );
        assert_eq!(ResolveError::Cancelled.coordinate(), None);
    }
}
