//! Coordination client
//!
//! TigerStyle: Scoped session ownership, release exactly once.
//!
//! A `CoordinationClient` owns at most one session against one ensemble. With
//! a bounded retry policy, `connect` performs the handshake eagerly and fails
//! fast. With `RetryPolicy::Forever` it returns at once and keeps trying in a
//! background task; operations and `is_connected` wait for the session.
//!
//! The session is released by `close()` or, failing that, by `Drop`. A
//! background handshake that completes after `close()` closes its own session
//! instead of publishing it.

use crate::connector;
use crate::error::{CoordError, CoordResult};
use crate::lock;
use crate::retry::{self, RetryPolicy};
use crate::session::{CreateMode, Session, SessionId};
use beacon_core::constants::SESSION_TIMEOUT_MS_DEFAULT;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Options for [`CoordinationClient::connect_with`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Requested session timeout
    pub session_timeout_ms: u64,
    /// Parent cancellation token
    pub cancel: Option<CancellationToken>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            session_timeout_ms: SESSION_TIMEOUT_MS_DEFAULT,
            cancel: None,
        }
    }
}

impl ClientOptions {
    /// Set the requested session timeout
    pub fn with_session_timeout_ms(mut self, session_timeout_ms: u64) -> Self {
        self.session_timeout_ms = session_timeout_ms;
        self
    }

    /// Attach a parent cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Check the options can open a session
    pub fn validate(&self) -> CoordResult<()> {
        if self.session_timeout_ms == 0 {
            return Err(CoordError::invalid_options(
                "session_timeout_ms",
                "must be positive",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Session Slot
// =============================================================================

/// Holds the client's session; publication and release are serialized
#[derive(Debug)]
struct SessionSlot {
    address: String,
    closed: Mutex<bool>,
    session: watch::Sender<Option<Arc<dyn Session>>>,
}

impl SessionSlot {
    fn new(address: String) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            address,
            closed: Mutex::new(false),
            session,
        }
    }

    /// Publish an established session; closes it if the slot is released
    fn publish(&self, session: Arc<dyn Session>) -> bool {
        let closed = lock(&self.closed);
        if *closed {
            session.close();
            return false;
        }
        self.session.send_replace(Some(session));
        true
    }

    /// Release the slot; returns true on the first call only
    fn release(&self) -> bool {
        let mut closed = lock(&self.closed);
        if *closed {
            return false;
        }
        *closed = true;
        if let Some(session) = self.session.send_replace(None) {
            session.close();
        }
        true
    }

    fn is_released(&self) -> bool {
        *lock(&self.closed)
    }

    fn current(&self) -> Option<Arc<dyn Session>> {
        self.session.borrow().clone()
    }
}

/// One session-establishment attempt: resolve the address, then handshake
async fn establish(address: &str, session_timeout_ms: u64) -> CoordResult<Arc<dyn Session>> {
    let ensemble = connector::resolve(address)?;
    ensemble.open_session(session_timeout_ms).await
}

// =============================================================================
// CoordinationClient
// =============================================================================

/// Client owning one session against one ensemble
#[derive(Debug)]
pub struct CoordinationClient {
    slot: Arc<SessionSlot>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl CoordinationClient {
    /// Connect with default options
    pub async fn connect(address: &str, policy: RetryPolicy) -> CoordResult<Self> {
        Self::connect_with(address, policy, ClientOptions::default()).await
    }

    /// Connect with explicit options
    ///
    /// # Errors
    /// `InvalidOptions` for an unusable policy or options. With a bounded
    /// policy, `ConnectionFailed` once every attempt has failed, or `Cancelled`
    /// if the token fires first. Unbounded policies never fail otherwise.
    #[instrument(skip(policy, options), fields(ensemble = %address))]
    pub async fn connect_with(
        address: &str,
        policy: RetryPolicy,
        options: ClientOptions,
    ) -> CoordResult<Self> {
        policy.validate()?;
        options.validate()?;

        let cancel = match &options.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let client = Self {
            slot: Arc::new(SessionSlot::new(address.to_string())),
            policy,
            cancel,
        };

        if client.policy.is_bounded() {
            client.connect_bounded(options.session_timeout_ms).await?;
        } else {
            client.spawn_connect(options.session_timeout_ms);
        }

        Ok(client)
    }

    async fn connect_bounded(&self, session_timeout_ms: u64) -> CoordResult<()> {
        let address = self.slot.address.as_str();
        let mut attempts: u32 = 0;

        let result = retry::retry(&self.policy, &self.cancel, "connect", || {
            attempts += 1;
            establish(address, session_timeout_ms)
        })
        .await;

        match result {
            Ok(session) => {
                info!(session_id = session.id(), attempts, "Session established");
                self.slot.publish(session);
                Ok(())
            }
            Err(CoordError::Cancelled) => Err(CoordError::Cancelled),
            Err(e) => {
                warn!(attempts, error = %e, "Session establishment failed");
                Err(CoordError::ConnectionFailed {
                    address: address.to_string(),
                    attempts,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn spawn_connect(&self, session_timeout_ms: u64) {
        let slot = self.slot.clone();
        let cancel = self.cancel.clone();
        let interval_ms = self.policy.sleep_ms(0);

        tokio::spawn(async move {
            let mut attempts: u64 = 0;
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                attempts += 1;
                match establish(&slot.address, session_timeout_ms).await {
                    Ok(session) => {
                        let session_id = session.id();
                        if slot.publish(session) {
                            debug!(ensemble = %slot.address, session_id, attempts, "Session established");
                        }
                        return;
                    }
                    Err(e) => {
                        if attempts == 1 {
                            warn!(ensemble = %slot.address, error = %e, "Session not yet established, retrying");
                        } else {
                            debug!(ensemble = %slot.address, attempts, error = %e, "Session attempt failed");
                        }
                    }
                }
                if retry::sleep_or_cancel(interval_ms, &cancel).await.is_err() {
                    return;
                }
            }
        });
    }

    /// Ensemble address this client connects to
    pub fn address(&self) -> &str {
        &self.slot.address
    }

    /// Retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Current session id, if a session is established
    pub fn session_id(&self) -> Option<SessionId> {
        self.slot.current().map(|s| s.id())
    }

    /// Token that cancels this client's waits
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.slot.is_released()
    }

    /// Block up to `timeout` for a connected session
    ///
    /// Never errors: a closed, cancelled or unreachable client reports false.
    pub async fn is_connected(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        let session = match tokio::time::timeout(timeout, self.wait_session()).await {
            Ok(Ok(session)) => session,
            _ => return false,
        };
        let remaining = timeout.saturating_sub(started.elapsed());
        session.wait_connected(remaining).await
    }

    /// Wait until the backend expires this client's session
    ///
    /// Waits for a session to be established first, then returns the id of
    /// the session once it has expired. Its ephemeral nodes are gone by then.
    ///
    /// # Errors
    /// `SessionClosed` once the client is closed, `Cancelled` if its token fires.
    pub async fn expired(&self) -> CoordResult<SessionId> {
        let session = self.wait_session().await?;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            _ = session.expired() => Ok(session.id()),
        }
    }

    /// Wait for the session to be published
    async fn wait_session(&self) -> CoordResult<Arc<dyn Session>> {
        if let Some(session) = self.slot.current() {
            return Ok(session);
        }
        if self.slot.is_released() {
            return Err(CoordError::SessionClosed);
        }

        let mut rx = self.slot.session.subscribe();
        let published = async move {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|s| s.clone())
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            session = published => session.ok_or(CoordError::SessionClosed),
        }
    }

    fn cancelled_error(&self) -> CoordError {
        if self.slot.is_released() {
            CoordError::SessionClosed
        } else {
            CoordError::Cancelled
        }
    }

    /// Run `op` against the session, retrying per policy
    async fn run<T, F, Fut>(&self, operation: &'static str, op: F) -> CoordResult<T>
    where
        F: Fn(Arc<dyn Session>) -> Fut,
        Fut: Future<Output = CoordResult<T>>,
    {
        let op = &op;
        retry::retry(&self.policy, &self.cancel, operation, || async move {
            let session = self.wait_session().await?;
            op(session).await
        })
        .await
        .map_err(|e| match e {
            CoordError::Cancelled => self.cancelled_error(),
            other => other,
        })
    }

    /// Create a node
    #[instrument(skip(self, data), fields(ensemble = %self.slot.address, bytes = data.len()))]
    pub async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()> {
        self.run("create", |s| async move { s.create(path, data, mode).await })
            .await
    }

    /// Create `path` and missing ancestors as persistent nodes
    #[instrument(skip(self), fields(ensemble = %self.slot.address))]
    pub async fn ensure_path(&self, path: &str) -> CoordResult<()> {
        self.run("ensure_path", |s| async move { s.ensure_path(path).await })
            .await
    }

    /// Whether a node exists
    pub async fn exists(&self, path: &str) -> CoordResult<bool> {
        self.run("exists", |s| async move { s.exists(path).await })
            .await
    }

    /// Direct children of a node, sorted
    #[instrument(skip(self), fields(ensemble = %self.slot.address))]
    pub async fn children(&self, path: &str) -> CoordResult<Vec<String>> {
        self.run("children", |s| async move { s.children(path).await })
            .await
    }

    /// Data stored at a node
    pub async fn get_data(&self, path: &str) -> CoordResult<Vec<u8>> {
        self.run("get_data", |s| async move { s.get_data(path).await })
            .await
    }

    /// Delete a node without children
    #[instrument(skip(self), fields(ensemble = %self.slot.address))]
    pub async fn delete(&self, path: &str) -> CoordResult<()> {
        self.run("delete", |s| async move { s.delete(path).await })
            .await
    }

    /// Release the session; idempotent
    pub fn close(&self) {
        if self.slot.release() {
            self.cancel.cancel();
            debug!(ensemble = %self.slot.address, "Coordination client closed");
        }
    }
}

impl Drop for CoordinationClient {
    fn drop(&mut self) {
        self.close();
    }
}
