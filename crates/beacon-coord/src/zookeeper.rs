//! ZooKeeper backend
//!
//! Sessions against a real ensemble via `zookeeper-client`. Compiled only
//! with the `zookeeper` feature.
//!
//! TigerStyle: Backend errors are mapped to explicit `CoordError` variants.

use crate::error::{CoordError, CoordResult};
use crate::lock;
use crate::session::{CreateMode, Ensemble, Session, SessionId};
use async_trait::async_trait;
use beacon_core::constants::CONNECTION_TIMEOUT_MS_DEFAULT;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use zookeeper_client as zk;

fn map_error(error: zk::Error, path: &str, session_id: SessionId) -> CoordError {
    match error {
        zk::Error::NoNode => CoordError::no_node(path),
        zk::Error::NodeExists => CoordError::node_exists(path),
        zk::Error::NotEmpty => CoordError::NotEmpty {
            path: path.to_string(),
        },
        zk::Error::ConnectionLoss => CoordError::connection_loss(path),
        zk::Error::SessionExpired => CoordError::SessionExpired { session_id },
        zk::Error::ClientClosed => CoordError::SessionClosed,
        other => CoordError::backend(other.to_string()),
    }
}

// =============================================================================
// ZooKeeperEnsemble
// =============================================================================

/// A ZooKeeper ensemble addressed by connect string
#[derive(Debug, Clone)]
pub struct ZooKeeperEnsemble {
    connect_string: String,
}

impl ZooKeeperEnsemble {
    /// Create from a `host:port[,host:port...]` connect string
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
        }
    }
}

#[async_trait]
impl Ensemble for ZooKeeperEnsemble {
    fn connect_string(&self) -> &str {
        &self.connect_string
    }

    async fn open_session(&self, session_timeout_ms: u64) -> CoordResult<Arc<dyn Session>> {
        let client = zk::Client::connector()
            .session_timeout(Duration::from_millis(session_timeout_ms))
            .connection_timeout(Duration::from_millis(CONNECTION_TIMEOUT_MS_DEFAULT))
            .connect(&self.connect_string)
            .await
            .map_err(|e| CoordError::ConnectionFailed {
                address: self.connect_string.clone(),
                attempts: 1,
                reason: e.to_string(),
            })?;

        let id = client.session_id().0 as SessionId;
        debug!(ensemble = %self.connect_string, session_id = id, "ZooKeeper session opened");

        Ok(Arc::new(ZooKeeperSession {
            id,
            client: Mutex::new(Some(client)),
        }))
    }
}

// =============================================================================
// ZooKeeperSession
// =============================================================================

/// Session against a ZooKeeper ensemble
#[derive(Debug)]
pub struct ZooKeeperSession {
    id: SessionId,
    client: Mutex<Option<zk::Client>>,
}

impl ZooKeeperSession {
    fn client(&self) -> CoordResult<zk::Client> {
        lock(&self.client).clone().ok_or(CoordError::SessionClosed)
    }
}

#[async_trait]
impl Session for ZooKeeperSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.client()
            .map(|c| c.state() == zk::SessionState::SyncConnected)
            .unwrap_or(false)
    }

    fn is_closed(&self) -> bool {
        lock(&self.client).is_none()
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        let client = match self.client() {
            Ok(client) => client,
            Err(_) => return false,
        };
        let mut watcher = client.state_watcher();
        let wait = async {
            loop {
                match watcher.state() {
                    zk::SessionState::SyncConnected => return true,
                    state if state.is_terminated() => return false,
                    _ => {}
                }
                watcher.changed().await;
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()> {
        let client = self.client()?;
        let zk_mode = match mode {
            CreateMode::Persistent => zk::CreateMode::Persistent,
            CreateMode::Ephemeral => zk::CreateMode::Ephemeral,
        };
        let options = zk_mode.with_acls(zk::Acls::anyone_all());
        client
            .create(path, data, &options)
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, path, self.id))
    }

    async fn exists(&self, path: &str) -> CoordResult<bool> {
        let client = self.client()?;
        client
            .check_stat(path)
            .await
            .map(|stat| stat.is_some())
            .map_err(|e| map_error(e, path, self.id))
    }

    async fn children(&self, path: &str) -> CoordResult<Vec<String>> {
        let client = self.client()?;
        let mut children = client
            .list_children(path)
            .await
            .map_err(|e| map_error(e, path, self.id))?;
        children.sort();
        Ok(children)
    }

    async fn get_data(&self, path: &str) -> CoordResult<Vec<u8>> {
        let client = self.client()?;
        client
            .get_data(path)
            .await
            .map(|(data, _stat)| data)
            .map_err(|e| map_error(e, path, self.id))
    }

    async fn delete(&self, path: &str) -> CoordResult<()> {
        let client = self.client()?;
        client
            .delete(path, None)
            .await
            .map_err(|e| map_error(e, path, self.id))
    }

    async fn expired(&self) {
        let client = match self.client() {
            Ok(client) => client,
            Err(_) => return std::future::pending().await,
        };
        let mut watcher = client.state_watcher();
        loop {
            match watcher.state() {
                zk::SessionState::Expired => return,
                state if state.is_terminated() => return std::future::pending().await,
                _ => {}
            }
            watcher.changed().await;
        }
    }

    fn close(&self) {
        if let Some(client) = lock(&self.client).take() {
            drop(client);
            debug!(session_id = self.id, "ZooKeeper session closed");
        }
    }
}
