//! Repository error types

use thiserror::Error;

/// Repository error type
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown resource id
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Missing or malformed required fields, empty payload
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Source resource is missing, of the wrong type, or its payload is gone
    #[error("Invalid derivation source: {0}")]
    InvalidSource(String),

    /// Lineage metadata disagrees with stored state (dangling references,
    /// duplicate derived children, recorded child without a payload)
    #[error("Inconsistent lineage: {0}")]
    InconsistentLineage(String),

    /// Derivation logic could not parse or process the source payload
    #[error("Computation error: {0}")]
    Computation(String),

    /// Metadata exists but the payload file it describes is missing
    #[error("Corrupted resource: {0}")]
    Corruption(String),

    /// IO error from the storage boundary
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("abc-123".to_string());
        assert_eq!(err.to_string(), "Resource not found: abc-123");

        let err = Error::Corruption("metadata exists but file is missing".to_string());
        assert!(err.to_string().starts_with("Corrupted resource:"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
