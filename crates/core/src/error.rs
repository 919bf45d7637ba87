//! Error types for Burrow
//!
//! Only construction, recovery and configuration loading surface errors to
//! callers. Mutations never fail for durability reasons; journal and
//! checkpoint failures are logged and counted instead.

use std::io;
use thiserror::Error;

/// Result type alias for Burrow operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error types for the durable cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persisted state exists but cannot be interpreted
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cache has been closed
    #[error("Cache '{0}' is closed")]
    Closed(String),
}

impl CacheError {
    /// Create a configuration error from a message
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        CacheError::InvalidConfig(msg.into())
    }

    /// Create a corruption error from a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        CacheError::Corruption(msg.into())
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = CacheError::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_serialization() {
        let err = CacheError::Serialization("invalid format".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Serialization error"));
        assert!(msg.contains("invalid format"));
    }

    #[test]
    fn test_error_display_corruption() {
        let err = CacheError::corruption("backup is not an array");
        assert!(err.to_string().contains("Data corruption"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display_closed() {
        let err = CacheError::Closed("mycache".to_string());
        assert!(err.to_string().contains("mycache"));
    }

    #[test]
    fn test_permission_denied_is_not_missing() {
        let err = CacheError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!err.is_not_found());
    }
}
