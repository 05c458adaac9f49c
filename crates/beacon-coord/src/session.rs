//! Session and ensemble abstractions
//!
//! TigerStyle: One trait per seam; backends are interchangeable.
//!
//! An [`Ensemble`] is one logically consistent coordination backend. A
//! [`Session`] is a single client lease against it: every ephemeral node
//! created through a session disappears when the session ends.

use crate::error::{CoordError, CoordResult};
use crate::path;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Backend-assigned session identifier
pub type SessionId = u64;

/// Node creation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session
    Persistent,
    /// Removed when the creating session ends
    Ephemeral,
}

impl CreateMode {
    /// Whether nodes in this mode are tied to their session
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral)
    }
}

/// A single coordination backend
#[async_trait]
pub trait Ensemble: Send + Sync + std::fmt::Debug {
    /// Address this ensemble was resolved from
    fn connect_string(&self) -> &str;

    /// Make a single session-establishment attempt
    async fn open_session(&self, session_timeout_ms: u64) -> CoordResult<Arc<dyn Session>>;
}

/// A live session against an ensemble
#[async_trait]
pub trait Session: Send + Sync + std::fmt::Debug {
    /// Session identifier
    fn id(&self) -> SessionId;

    /// Whether the session currently has a live connection
    fn is_connected(&self) -> bool;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;

    /// Wait up to `timeout` for the session to be connected
    async fn wait_connected(&self, timeout: Duration) -> bool;

    /// Create a node; the parent must exist
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()>;

    /// Whether a node exists
    async fn exists(&self, path: &str) -> CoordResult<bool>;

    /// Names of the direct children of a node, sorted
    async fn children(&self, path: &str) -> CoordResult<Vec<String>>;

    /// Data stored at a node
    async fn get_data(&self, path: &str) -> CoordResult<Vec<u8>>;

    /// Delete a node without children
    async fn delete(&self, path: &str) -> CoordResult<()>;

    /// Resolve once the backend has expired this session
    ///
    /// Never resolves for a session its owner closed.
    async fn expired(&self);

    /// Close the session, removing its ephemeral nodes
    ///
    /// Idempotent. Synchronous so that it can run from `Drop`.
    fn close(&self);

    /// Create `path` and any missing ancestors as persistent nodes
    async fn ensure_path(&self, path: &str) -> CoordResult<()> {
        path::validate(path)?;
        for prefix in path::prefixes(path) {
            match self.create(prefix, &[], CreateMode::Persistent).await {
                Ok(()) | Err(CoordError::NodeExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode() {
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(!CreateMode::Persistent.is_ephemeral());
    }
}
