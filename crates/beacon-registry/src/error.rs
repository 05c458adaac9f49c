//! Registry error types
//!
//! TigerStyle: Explicit error variants with context.

use beacon_coord::CoordError;
use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Descriptor failed validation
    #[error("invalid service descriptor: {field}, reason: {reason}")]
    InvalidDescriptor { field: String, reason: String },

    /// Local host name or address lookup failed
    #[error("host resolution failed: {reason}")]
    HostResolutionFailed { reason: String },

    /// Ensemble unreachable within the retry budget
    #[error("connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Instance record could not be encoded or decoded
    #[error("invalid instance record at {path}: {reason}")]
    InvalidRecord { path: String, reason: String },

    /// Every generated instance id collided
    #[error("no free instance id for service {service_name} after {attempts} attempts")]
    InstanceIdExhausted { service_name: String, attempts: u32 },

    /// Any other coordination failure
    #[error("coordination error: {0}")]
    Coordination(CoordError),
}

impl RegistryError {
    /// Create an invalid descriptor error
    pub fn invalid_descriptor(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a host resolution error
    pub fn host_resolution(reason: impl Into<String>) -> Self {
        Self::HostResolutionFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid record error
    pub fn invalid_record(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::Coordination(e) => e.is_retriable(),
            _ => false,
        }
    }
}

impl From<CoordError> for RegistryError {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::ConnectionFailed {
                address, reason, ..
            } => Self::ConnectionFailed { address, reason },
            other => Self::Coordination(other),
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_coord_error() {
        let err: RegistryError = CoordError::ConnectionFailed {
            address: "mem://x".into(),
            attempts: 4,
            reason: "down".into(),
        }
        .into();
        assert!(matches!(err, RegistryError::ConnectionFailed { .. }));
        assert!(err.is_retriable());

        let err: RegistryError = CoordError::no_node("/a").into();
        assert_eq!(err, RegistryError::Coordination(CoordError::no_node("/a")));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::invalid_descriptor("service_name", "cannot be empty");
        assert!(err.to_string().contains("service_name"));
        assert!(RegistryError::host_resolution("no dns")
            .to_string()
            .contains("no dns"));
    }
}
