//! In-process ensemble
//!
//! TigerStyle: Deterministic backend with explicit fault injection.
//!
//! A `MemoryEnsemble` behaves like a single-node coordination server with a
//! persistent data directory: a hierarchical node tree, ephemeral nodes tied
//! to sessions, and an on/off switch. Ensembles are registered in a
//! process-wide table under `mem://<name>` so that code which only knows an
//! address string can reach them.
//!
//! Fault injection:
//! - `stop()` / `start()` / `restart()`: connectivity goes away and comes
//!   back; data and live sessions survive.
//! - `expire_session(id)`: the session ends and its ephemeral nodes vanish.
//! - `delete_node(path)`: administrative recursive deletion.
//! - `inject_read_fault(path)`: reads at or below `path` fail with a
//!   backend error until `clear_read_faults()`.

use crate::error::{CoordError, CoordResult};
use crate::lock;
use crate::path;
use crate::session::{CreateMode, Ensemble, Session, SessionId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Scheme prefix for in-process ensemble addresses
pub const MEMORY_SCHEME: &str = "mem://";

/// Counter for anonymous ensemble names
static ENSEMBLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide table of live in-process ensembles
fn ensembles() -> &'static Mutex<HashMap<String, Weak<EnsembleInner>>> {
    static TABLE: OnceLock<Mutex<HashMap<String, Weak<EnsembleInner>>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

// =============================================================================
// Ensemble State
// =============================================================================

#[derive(Debug, Clone)]
struct ZNode {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Live,
    Expired,
    Closed,
}

#[derive(Debug)]
struct EnsembleState {
    nodes: BTreeMap<String, ZNode>,
    sessions: HashMap<SessionId, SessionState>,
    read_faults: BTreeSet<String>,
}

impl EnsembleState {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            path::ROOT.to_string(),
            ZNode {
                data: Vec::new(),
                ephemeral_owner: None,
            },
        );
        Self {
            nodes,
            sessions: HashMap::new(),
            read_faults: BTreeSet::new(),
        }
    }

    fn check_read_fault(&self, node_path: &str) -> CoordResult<()> {
        let faulted = self.read_faults.iter().any(|fault| {
            node_path == fault
                || node_path
                    .strip_prefix(fault.as_str())
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false)
        });
        if faulted {
            return Err(CoordError::backend(format!(
                "injected read fault at {}",
                node_path
            )));
        }
        Ok(())
    }

    fn has_children(&self, node_path: &str) -> bool {
        self.nodes
            .keys()
            .any(|k| path::parent(k) == Some(node_path))
    }

    /// End a live session, removing its ephemeral nodes
    fn end_session(&mut self, id: SessionId, state: SessionState) -> bool {
        match self.sessions.get_mut(&id) {
            Some(current) if *current == SessionState::Live => *current = state,
            _ => return false,
        }
        self.nodes
            .retain(|_, node| node.ephemeral_owner != Some(id));
        true
    }

    /// Remove `node_path` and everything below it
    fn remove_subtree(&mut self, node_path: &str) -> usize {
        let child_prefix = format!("{}/", node_path);
        let before = self.nodes.len();
        self.nodes
            .retain(|k, _| k != node_path && !k.starts_with(&child_prefix));
        before - self.nodes.len()
    }
}

#[derive(Debug)]
struct EnsembleInner {
    name: String,
    connect_string: String,
    state: Mutex<EnsembleState>,
    running: watch::Sender<bool>,
    /// Bumped on every session expiry
    expirations: watch::Sender<u64>,
    next_session_id: AtomicU64,
}

impl EnsembleInner {
    fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    fn state(&self) -> MutexGuard<'_, EnsembleState> {
        lock(&self.state)
    }
}

impl Drop for EnsembleInner {
    fn drop(&mut self) {
        let mut table = lock(ensembles());
        if table
            .get(&self.name)
            .map(|w| w.strong_count() == 0)
            .unwrap_or(false)
        {
            table.remove(&self.name);
        }
    }
}

// =============================================================================
// MemoryEnsemble
// =============================================================================

/// In-process coordination ensemble
#[derive(Debug, Clone)]
pub struct MemoryEnsemble {
    inner: Arc<EnsembleInner>,
}

impl MemoryEnsemble {
    /// Create a running ensemble with a unique name
    pub fn new() -> Self {
        let n = ENSEMBLE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::open(format!("ensemble-{}", n))
    }

    /// Get the live ensemble called `name`, creating it if needed
    ///
    /// # Errors
    /// `InvalidOptions` for an empty name.
    pub fn named(name: impl Into<String>) -> CoordResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoordError::invalid_options("name", "cannot be empty"));
        }
        Ok(Self::open(name))
    }

    fn open(name: String) -> Self {
        let mut table = lock(ensembles());
        if let Some(inner) = table.get(&name).and_then(Weak::upgrade) {
            return Self { inner };
        }

        let (running, _) = watch::channel(true);
        let (expirations, _) = watch::channel(0);
        let inner = Arc::new(EnsembleInner {
            connect_string: format!("{}{}", MEMORY_SCHEME, name),
            name: name.clone(),
            state: Mutex::new(EnsembleState::new()),
            running,
            expirations,
            next_session_id: AtomicU64::new(1),
        });
        table.insert(name, Arc::downgrade(&inner));
        debug!(ensemble = %inner.connect_string, "Memory ensemble created");
        Self { inner }
    }

    /// Look up a live ensemble by its `mem://` address
    pub fn lookup(address: &str) -> Option<Self> {
        let name = address.strip_prefix(MEMORY_SCHEME)?;
        lock(ensembles())
            .get(name)
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Address clients use to reach this ensemble
    pub fn address(&self) -> &str {
        &self.inner.connect_string
    }

    /// Whether the ensemble accepts connections
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Stop serving; sessions lose their connection but stay alive
    pub fn stop(&self) {
        self.inner.running.send_replace(false);
        info!(ensemble = %self.address(), "Memory ensemble stopped");
    }

    /// Resume serving
    pub fn start(&self) {
        self.inner.running.send_replace(true);
        info!(ensemble = %self.address(), "Memory ensemble started");
    }

    /// Stop then start; data and live sessions survive
    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// Expire a session, removing its ephemeral nodes
    ///
    /// Returns false if the session was not live.
    pub fn expire_session(&self, id: SessionId) -> bool {
        let expired = self.inner.state().end_session(id, SessionState::Expired);
        if expired {
            self.inner.expirations.send_modify(|n| *n += 1);
            info!(ensemble = %self.address(), session_id = id, "Session expired");
        }
        expired
    }

    /// Administratively delete a node and its subtree
    ///
    /// Returns the number of nodes removed.
    pub fn delete_node(&self, node_path: &str) -> usize {
        if node_path == path::ROOT {
            return 0;
        }
        let removed = self.inner.state().remove_subtree(node_path);
        info!(ensemble = %self.address(), path = node_path, removed, "Node deleted");
        removed
    }

    /// Make reads at or below `node_path` fail
    pub fn inject_read_fault(&self, node_path: &str) {
        self.inner
            .state()
            .read_faults
            .insert(node_path.to_string());
    }

    /// Remove every injected read fault
    pub fn clear_read_faults(&self) {
        self.inner.state().read_faults.clear();
    }

    /// Whether a node exists, regardless of connectivity
    pub fn node_exists(&self, node_path: &str) -> bool {
        self.inner.state().nodes.contains_key(node_path)
    }

    /// Owner of an ephemeral node
    pub fn ephemeral_owner(&self, node_path: &str) -> Option<SessionId> {
        self.inner
            .state()
            .nodes
            .get(node_path)
            .and_then(|n| n.ephemeral_owner)
    }

    /// Ids of sessions that are still live
    pub fn live_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .inner
            .state()
            .sessions
            .iter()
            .filter(|(_, s)| **s == SessionState::Live)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ensemble for MemoryEnsemble {
    fn connect_string(&self) -> &str {
        self.address()
    }

    async fn open_session(&self, session_timeout_ms: u64) -> CoordResult<Arc<dyn Session>> {
        if !self.inner.is_running() {
            return Err(CoordError::ConnectionFailed {
                address: self.address().to_string(),
                attempts: 1,
                reason: "ensemble not running".into(),
            });
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.inner.state().sessions.insert(id, SessionState::Live);
        debug!(ensemble = %self.address(), session_id = id, "Session opened");

        Ok(Arc::new(MemorySession {
            id,
            session_timeout_ms,
            ensemble: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

// =============================================================================
// MemorySession
// =============================================================================

/// Session against a [`MemoryEnsemble`]
#[derive(Debug)]
pub struct MemorySession {
    id: SessionId,
    session_timeout_ms: u64,
    ensemble: Arc<EnsembleInner>,
    closed: AtomicBool,
}

impl MemorySession {
    /// Negotiated session timeout
    pub fn session_timeout_ms(&self) -> u64 {
        self.session_timeout_ms
    }

    /// Lock the tree after checking the session may act on it
    fn checked(&self, operation: &str) -> CoordResult<MutexGuard<'_, EnsembleState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordError::SessionClosed);
        }
        if !self.ensemble.is_running() {
            return Err(CoordError::connection_loss(operation));
        }
        let state = self.ensemble.state();
        match state.sessions.get(&self.id) {
            Some(SessionState::Live) => Ok(state),
            Some(SessionState::Closed) => Err(CoordError::SessionClosed),
            _ => Err(CoordError::SessionExpired {
                session_id: self.id,
            }),
        }
    }

    fn is_live(&self) -> bool {
        matches!(
            self.ensemble.state().sessions.get(&self.id),
            Some(SessionState::Live)
        )
    }

    fn is_expired(&self) -> bool {
        matches!(
            self.ensemble.state().sessions.get(&self.id),
            Some(SessionState::Expired)
        )
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.ensemble.is_running() && self.is_live()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        if self.is_closed() || !self.is_live() {
            return false;
        }
        let mut running = self.ensemble.running.subscribe();
        let became_running = tokio::time::timeout(timeout, running.wait_for(|r| *r))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        became_running && self.is_connected()
    }

    async fn create(&self, node_path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()> {
        path::validate(node_path)?;
        let mut state = self.checked("create")?;

        if state.nodes.contains_key(node_path) {
            return Err(CoordError::node_exists(node_path));
        }
        let parent = path::parent(node_path).ok_or_else(|| CoordError::node_exists(node_path))?;
        match state.nodes.get(parent) {
            None => return Err(CoordError::no_node(parent)),
            Some(p) if p.ephemeral_owner.is_some() => {
                return Err(CoordError::backend(format!(
                    "ephemeral node {} cannot have children",
                    parent
                )))
            }
            Some(_) => {}
        }

        state.nodes.insert(
            node_path.to_string(),
            ZNode {
                data: data.to_vec(),
                ephemeral_owner: mode.is_ephemeral().then_some(self.id),
            },
        );
        Ok(())
    }

    async fn exists(&self, node_path: &str) -> CoordResult<bool> {
        path::validate(node_path)?;
        let state = self.checked("exists")?;
        Ok(state.nodes.contains_key(node_path))
    }

    async fn children(&self, node_path: &str) -> CoordResult<Vec<String>> {
        path::validate(node_path)?;
        let state = self.checked("children")?;
        state.check_read_fault(node_path)?;
        if !state.nodes.contains_key(node_path) {
            return Err(CoordError::no_node(node_path));
        }
        Ok(state
            .nodes
            .keys()
            .filter(|k| path::parent(k) == Some(node_path))
            .map(|k| path::name(k).to_string())
            .collect())
    }

    async fn get_data(&self, node_path: &str) -> CoordResult<Vec<u8>> {
        path::validate(node_path)?;
        let state = self.checked("get_data")?;
        state.check_read_fault(node_path)?;
        state
            .nodes
            .get(node_path)
            .map(|n| n.data.clone())
            .ok_or_else(|| CoordError::no_node(node_path))
    }

    async fn delete(&self, node_path: &str) -> CoordResult<()> {
        path::validate(node_path)?;
        if node_path == path::ROOT {
            return Err(CoordError::invalid_path(node_path, "cannot delete root"));
        }
        let mut state = self.checked("delete")?;
        if !state.nodes.contains_key(node_path) {
            return Err(CoordError::no_node(node_path));
        }
        if state.has_children(node_path) {
            return Err(CoordError::NotEmpty {
                path: node_path.to_string(),
            });
        }
        state.nodes.remove(node_path);
        Ok(())
    }

    async fn expired(&self) {
        let mut expirations = self.ensemble.expirations.subscribe();
        loop {
            if self.is_expired() {
                return;
            }
            if expirations.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ensemble
            .state()
            .end_session(self.id, SessionState::Closed);
        debug!(ensemble = %self.ensemble.connect_string, session_id = self.id, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn session(ensemble: &MemoryEnsemble) -> Arc<dyn Session> {
        ensemble.open_session(1_000).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;

        s.ensure_path("/ns/svc").await.unwrap();
        s.create("/ns/svc/a", b"hello", CreateMode::Ephemeral)
            .await
            .unwrap();

        assert_eq!(s.get_data("/ns/svc/a").await.unwrap(), b"hello");
        assert_eq!(s.children("/ns/svc").await.unwrap(), vec!["a"]);
        assert_eq!(s.children("/ns").await.unwrap(), vec!["svc"]);
        assert!(s.exists("/ns").await.unwrap());
        assert!(!s.exists("/nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_errors() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;

        assert!(matches!(
            s.create("/a/b", b"", CreateMode::Persistent).await,
            Err(CoordError::NoNode { .. })
        ));
        s.create("/a", b"", CreateMode::Persistent).await.unwrap();
        assert!(matches!(
            s.create("/a", b"", CreateMode::Persistent).await,
            Err(CoordError::NodeExists { .. })
        ));
        s.create("/e", b"", CreateMode::Ephemeral).await.unwrap();
        assert!(matches!(
            s.create("/e/child", b"", CreateMode::Persistent).await,
            Err(CoordError::Backend { .. })
        ));
        assert!(matches!(
            s.create("bad", b"", CreateMode::Persistent).await,
            Err(CoordError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_path_idempotent() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;

        s.ensure_path("/a/b/c").await.unwrap();
        s.ensure_path("/a/b/c").await.unwrap();
        assert!(ensemble.node_exists("/a/b/c"));
    }

    #[tokio::test]
    async fn test_children_sorted() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;

        s.ensure_path("/ns").await.unwrap();
        for name in ["zeta", "alpha", "mid"] {
            s.create(&format!("/ns/{}", name), b"", CreateMode::Persistent)
                .await
                .unwrap();
        }
        assert_eq!(s.children("/ns").await.unwrap(), vec!["alpha", "mid", "zeta"]);
        assert!(matches!(
            s.children("/missing").await,
            Err(CoordError::NoNode { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;

        s.ensure_path("/a/b").await.unwrap();
        assert!(matches!(
            s.delete("/a").await,
            Err(CoordError::NotEmpty { .. })
        ));
        s.delete("/a/b").await.unwrap();
        s.delete("/a").await.unwrap();
        assert!(matches!(
            s.delete("/a").await,
            Err(CoordError::NoNode { .. })
        ));
        assert!(s.delete("/").await.is_err());
    }

    #[tokio::test]
    async fn test_close_removes_ephemerals_only() {
        let ensemble = MemoryEnsemble::new();
        let owner = session(&ensemble).await;
        let other = session(&ensemble).await;

        owner.ensure_path("/ns").await.unwrap();
        owner
            .create("/ns/mine", b"", CreateMode::Ephemeral)
            .await
            .unwrap();
        other
            .create("/ns/theirs", b"", CreateMode::Ephemeral)
            .await
            .unwrap();

        owner.close();
        owner.close();

        assert!(owner.is_closed());
        assert!(!ensemble.node_exists("/ns/mine"));
        assert!(ensemble.node_exists("/ns/theirs"));
        assert!(ensemble.node_exists("/ns"));
        assert_eq!(ensemble.live_sessions(), vec![other.id()]);
        assert_eq!(
            owner.children("/ns").await,
            Err(CoordError::SessionClosed)
        );
    }

    #[tokio::test]
    async fn test_stop_and_start() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        s.create("/keep", b"", CreateMode::Ephemeral).await.unwrap();

        ensemble.stop();
        assert!(!s.is_connected());
        assert!(!s.wait_connected(Duration::from_millis(10)).await);
        assert!(matches!(
            s.children("/").await,
            Err(CoordError::ConnectionLoss { .. })
        ));
        assert!(matches!(
            ensemble.open_session(1_000).await,
            Err(CoordError::ConnectionFailed { .. })
        ));

        ensemble.start();
        assert!(s.wait_connected(Duration::from_millis(10)).await);
        assert_eq!(s.children("/").await.unwrap(), vec!["keep"]);
    }

    #[tokio::test]
    async fn test_wait_connected_wakes_on_start() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        ensemble.stop();

        let starter = ensemble.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            starter.start();
        });

        assert!(s.wait_connected(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_expire_session() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        s.create("/eph", b"", CreateMode::Ephemeral).await.unwrap();

        assert!(ensemble.expire_session(s.id()));
        assert!(!ensemble.expire_session(s.id()));
        assert!(!ensemble.node_exists("/eph"));
        assert!(!s.is_connected());
        assert_eq!(
            s.get_data("/eph").await,
            Err(CoordError::SessionExpired { session_id: s.id() })
        );
    }

    #[tokio::test]
    async fn test_expired_wakes_only_the_expired_session() {
        let ensemble = MemoryEnsemble::new();
        let doomed = session(&ensemble).await;
        let survivor = session(&ensemble).await;

        let expirer = ensemble.clone();
        let doomed_id = doomed.id();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            expirer.expire_session(doomed_id);
        });

        tokio::time::timeout(Duration::from_secs(5), doomed.expired())
            .await
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), survivor.expired())
                .await
                .is_err()
        );

        // A closed session never reports expiry
        survivor.close();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), survivor.expired())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_admin_delete_node() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        s.ensure_path("/ns/a").await.unwrap();
        s.create("/ns/a/x", b"", CreateMode::Ephemeral).await.unwrap();
        s.ensure_path("/ns/ab").await.unwrap();

        assert_eq!(ensemble.delete_node("/ns/a"), 2);
        assert!(ensemble.node_exists("/ns/ab"));
        assert_eq!(ensemble.delete_node("/"), 0);
    }

    #[tokio::test]
    async fn test_lookup_by_address() {
        let ensemble = MemoryEnsemble::named("lookup-test").unwrap();
        assert!(MemoryEnsemble::named("").is_err());
        let found = MemoryEnsemble::lookup("mem://lookup-test").unwrap();
        assert_eq!(found.address(), ensemble.address());

        let s = session(&ensemble).await;
        s.create("/shared", b"", CreateMode::Persistent).await.unwrap();
        assert!(found.node_exists("/shared"));

        assert!(MemoryEnsemble::lookup("lookup-test").is_none());
        assert!(MemoryEnsemble::lookup("mem://never-created").is_none());
    }

    #[tokio::test]
    async fn test_read_faults() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        s.ensure_path("/ns/bad/x").await.unwrap();
        s.ensure_path("/ns/badge").await.unwrap();

        ensemble.inject_read_fault("/ns/bad");
        assert!(matches!(
            s.children("/ns/bad").await,
            Err(CoordError::Backend { .. })
        ));
        assert!(s.get_data("/ns/bad/x").await.is_err());
        assert!(s.children("/ns/badge").await.is_ok());
        assert!(s.children("/ns").await.is_ok());

        ensemble.clear_read_faults();
        assert_eq!(s.children("/ns/bad").await.unwrap(), vec!["x"]);
    }

    #[test]
    fn test_dropped_ensemble_leaves_table() {
        let address = {
            let ensemble = MemoryEnsemble::new();
            ensemble.address().to_string()
        };
        assert!(MemoryEnsemble::lookup(&address).is_none());
    }
}
