//! Coordination error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Coordination-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// Session handshake did not complete within the retry budget
    #[error("connection to ensemble {address} failed after {attempts} attempt(s): {reason}")]
    ConnectionFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    /// No established session is available
    #[error("not connected to ensemble {address}")]
    NotConnected { address: String },

    /// The session lost its connection (may recover)
    #[error("connection loss during {operation}")]
    ConnectionLoss { operation: String },

    /// The session expired; its ephemeral nodes are gone
    #[error("session {session_id:#x} expired")]
    SessionExpired { session_id: u64 },

    /// The session was closed by its owner
    #[error("session closed")]
    SessionClosed,

    /// Node does not exist
    #[error("no node: {path}")]
    NoNode { path: String },

    /// Node already exists
    #[error("node already exists: {path}")]
    NodeExists { path: String },

    /// Node has children and cannot be deleted
    #[error("node not empty: {path}")]
    NotEmpty { path: String },

    /// Path is not a valid namespace path
    #[error("invalid path: {path}, reason: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Operation cancelled through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Any other backend failure
    #[error("backend error: {reason}")]
    Backend { reason: String },

    /// Client options or retry policy cannot be used
    #[error("invalid option {field}: {reason}")]
    InvalidOptions { field: String, reason: String },
}

impl CoordError {
    /// Create a connection loss error
    pub fn connection_loss(operation: impl Into<String>) -> Self {
        Self::ConnectionLoss {
            operation: operation.into(),
        }
    }

    /// Create a no node error
    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    /// Create a node exists error
    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists { path: path.into() }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend error
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Create an invalid options error
    pub fn invalid_options(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    ///
    /// Only connectivity failures are retried; data errors never are.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLoss { .. } | Self::NotConnected { .. } | Self::ConnectionFailed { .. }
        )
    }
}

/// Result type for coordination operations
pub type CoordResult<T> = std::result::Result<T, CoordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordError::no_node("/zk-srv-discovery/Worker_1");
        assert!(err.to_string().contains("/zk-srv-discovery/Worker_1"));

        let err = CoordError::SessionExpired { session_id: 255 };
        assert_eq!(err.to_string(), "session 0xff expired");
    }

    #[test]
    fn test_error_retriable() {
        assert!(CoordError::connection_loss("create").is_retriable());
        assert!(CoordError::NotConnected {
            address: "mem://a".into()
        }
        .is_retriable());

        assert!(!CoordError::no_node("/x").is_retriable());
        assert!(!CoordError::node_exists("/x").is_retriable());
        assert!(!CoordError::SessionClosed.is_retriable());
        assert!(!CoordError::Cancelled.is_retriable());
    }
}
