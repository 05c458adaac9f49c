//! Registration manager
//!
//! TigerStyle: Every registration owns exactly one session at a time; each
//! session is released exactly once.
//!
//! Each successful registration opens its own coordination session (bounded
//! retry) and publishes one ephemeral instance node at
//! `<namespace>/<serviceName>/<id>`. The node lives as long as the session:
//! unregistering, dropping the manager, process death followed by session
//! timeout, or an administrative deletion all remove it.
//!
//! When the ensemble expires a registration's session, the instance is
//! published again on a fresh session under a fresh id, retrying until it
//! succeeds or the registration is torn down. The handle stays the same.
//!
//! Registrations are kept in an arena keyed by `RegistrationHandle`.
//! `unregister()` tears down the most recent one; `unregister_handle()`
//! targets a specific one.

use crate::descriptor::ServiceDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::host::{HostResolver, SystemHostResolver};
use crate::instance::{InstanceRecord, ServiceType, UriSpec, URI_SPEC_DEFAULT};
use beacon_coord::retry::sleep_or_cancel;
use beacon_coord::{path, ClientOptions, CoordError, CoordinationClient, CreateMode, RetryPolicy};
use beacon_core::{
    TimeProvider, WallClockTime, INSTANCE_ID_ATTEMPTS_COUNT_MAX, INSTANCE_RECORD_SIZE_BYTES_MAX,
    NAMESPACE_PATH_DEFAULT, REREGISTRATION_RETRY_INTERVAL_MS, SESSION_TIMEOUT_MS_DEFAULT,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Outcome of the boundary `register` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStatus {
    Success,
    Fail,
}

impl RegisterStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Process exit code (0 on success)
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Fail => 1,
        }
    }
}

/// Identifies one registration within a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationHandle(u64);

impl fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration-{}", self.0)
    }
}

/// A published instance
///
/// Path and record change when the instance is re-published after a
/// session expiry; the handle does not.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub handle: RegistrationHandle,
    /// Ensemble the instance was published to
    pub ensemble: String,
    /// Node path of the instance
    pub path: String,
    pub record: InstanceRecord,
}

impl Registration {
    pub fn instance_id(&self) -> &str {
        &self.record.id
    }

    pub fn service_name(&self) -> &str {
        &self.record.name
    }
}

#[derive(Debug)]
struct ActiveRegistration {
    registration: Registration,
    client: Arc<CoordinationClient>,
    /// Stops the expiry watcher
    watcher: CancellationToken,
}

impl ActiveRegistration {
    fn release(&self) {
        self.watcher.cancel();
        self.client.close();
    }
}

type ActiveList = Mutex<Vec<ActiveRegistration>>;

fn lock_active(active: &ActiveList) -> MutexGuard<'_, Vec<ActiveRegistration>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Publisher
// =============================================================================

/// Opens registration sessions and publishes records
#[derive(Debug, Clone)]
struct Publisher {
    namespace_path: String,
    policy: RetryPolicy,
    session_timeout_ms: u64,
    time: Arc<dyn TimeProvider>,
}

impl Publisher {
    /// Open a session and publish `record` under a fresh id
    ///
    /// On error the session is released.
    async fn publish_new(
        &self,
        address: &str,
        record: &mut InstanceRecord,
    ) -> RegistryResult<(CoordinationClient, String)> {
        let service_path = path::join(&self.namespace_path, &record.name)?;

        let options = ClientOptions::default().with_session_timeout_ms(self.session_timeout_ms);
        let client = CoordinationClient::connect_with(address, self.policy.clone(), options).await?;
        client.ensure_path(&service_path).await?;

        record.registration_time_utc = self.time.now_ms();
        let instance_path = self.publish(&client, &service_path, record).await?;
        Ok((client, instance_path))
    }

    /// Create the ephemeral node, drawing a fresh id on collision
    async fn publish(
        &self,
        client: &CoordinationClient,
        service_path: &str,
        record: &mut InstanceRecord,
    ) -> RegistryResult<String> {
        for attempt in 1..=INSTANCE_ID_ATTEMPTS_COUNT_MAX {
            record.id = Uuid::new_v4().to_string();
            let instance_path = path::join(service_path, &record.id)?;

            let data = record
                .to_bytes()
                .map_err(|e| RegistryError::invalid_record(&instance_path, e.to_string()))?;
            if data.len() > INSTANCE_RECORD_SIZE_BYTES_MAX {
                return Err(RegistryError::invalid_record(
                    &instance_path,
                    format!(
                        "record size {} exceeds max {}",
                        data.len(),
                        INSTANCE_RECORD_SIZE_BYTES_MAX
                    ),
                ));
            }

            match client
                .create(&instance_path, &data, CreateMode::Ephemeral)
                .await
            {
                Ok(()) => return Ok(instance_path),
                Err(CoordError::NodeExists { .. }) => {
                    warn!(path = %instance_path, attempt, "Instance id collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::InstanceIdExhausted {
            service_name: record.name.clone(),
            attempts: INSTANCE_ID_ATTEMPTS_COUNT_MAX,
        })
    }
}

// =============================================================================
// Expiry Watcher
// =============================================================================

/// Keeps one registration published across session expiries
struct ExpiryWatcher {
    handle: RegistrationHandle,
    address: String,
    publisher: Publisher,
    active: Weak<ActiveList>,
    stop: CancellationToken,
    retry_interval_ms: u64,
}

impl ExpiryWatcher {
    async fn run(self, mut client: Arc<CoordinationClient>) {
        loop {
            let session_id = tokio::select! {
                _ = self.stop.cancelled() => return,
                expired = client.expired() => match expired {
                    Ok(session_id) => session_id,
                    Err(_) => return,
                },
            };

            let Some(mut record) = self.current_record() else {
                return;
            };
            error!(
                registration = %self.handle,
                service_name = %record.name,
                instance_id = %record.id,
                session_id,
                ensemble = %self.address,
                "Session expired, instance removed; re-registering"
            );

            client = match self.republish(&mut record).await {
                Some(client) => client,
                None => return,
            };
        }
    }

    /// Publish again until it succeeds; `None` once the registration is gone
    async fn republish(&self, record: &mut InstanceRecord) -> Option<Arc<CoordinationClient>> {
        loop {
            if self.stop.is_cancelled() {
                return None;
            }
            match self.publisher.publish_new(&self.address, record).await {
                Ok((client, instance_path)) => {
                    let client = self.install(client, instance_path, record.clone())?;
                    info!(
                        registration = %self.handle,
                        service_name = %record.name,
                        instance_id = %record.id,
                        ensemble = %self.address,
                        "Service re-registered"
                    );
                    return Some(client);
                }
                Err(e) => {
                    warn!(
                        registration = %self.handle,
                        ensemble = %self.address,
                        error = %e,
                        retry_in_ms = self.retry_interval_ms,
                        "Re-registration failed"
                    );
                    sleep_or_cancel(self.retry_interval_ms, &self.stop).await.ok()?;
                }
            }
        }
    }

    fn current_record(&self) -> Option<InstanceRecord> {
        let active = self.active.upgrade()?;
        let list = lock_active(&active);
        list.iter()
            .find(|a| a.registration.handle == self.handle)
            .map(|a| a.registration.record.clone())
    }

    /// Swap the fresh session into the arena, closing the expired one
    ///
    /// Returns `None`, releasing the fresh session, when the registration
    /// was torn down meanwhile.
    fn install(
        &self,
        client: CoordinationClient,
        instance_path: String,
        record: InstanceRecord,
    ) -> Option<Arc<CoordinationClient>> {
        let client = Arc::new(client);
        let active = self.active.upgrade()?;
        let previous = {
            let mut list = lock_active(&active);
            let entry = list
                .iter_mut()
                .find(|a| a.registration.handle == self.handle)?;
            entry.registration.path = instance_path;
            entry.registration.record = record;
            std::mem::replace(&mut entry.client, client.clone())
        };
        previous.close();
        Some(client)
    }
}

// =============================================================================
// RegistrationManager
// =============================================================================

/// Publishes and retracts service instances
#[derive(Debug)]
pub struct RegistrationManager {
    publisher: Publisher,
    resolver: Arc<dyn HostResolver>,
    reregister_interval_ms: u64,
    active: Arc<ActiveList>,
    next_handle: AtomicU64,
}

impl Default for RegistrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationManager {
    /// Manager with production defaults
    pub fn new() -> Self {
        Self {
            publisher: Publisher {
                namespace_path: NAMESPACE_PATH_DEFAULT.to_string(),
                policy: RetryPolicy::registration(),
                session_timeout_ms: SESSION_TIMEOUT_MS_DEFAULT,
                time: Arc::new(WallClockTime::new()),
            },
            resolver: Arc::new(SystemHostResolver),
            reregister_interval_ms: REREGISTRATION_RETRY_INTERVAL_MS,
            active: Arc::new(Mutex::new(Vec::new())),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Use a different namespace root
    pub fn with_namespace(mut self, namespace_path: impl Into<String>) -> Self {
        self.publisher.namespace_path = namespace_path.into();
        self
    }

    /// Use a different session retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.publisher.policy = policy;
        self
    }

    /// Request a different session timeout
    pub fn with_session_timeout_ms(mut self, session_timeout_ms: u64) -> Self {
        self.publisher.session_timeout_ms = session_timeout_ms;
        self
    }

    /// Use a different host resolver
    pub fn with_host_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a different time source for registration timestamps
    pub fn with_time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.publisher.time = time;
        self
    }

    /// Pause between re-registration attempts after a session expiry
    pub fn with_reregister_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reregister_interval_ms = interval_ms;
        self
    }

    pub fn namespace_path(&self) -> &str {
        &self.publisher.namespace_path
    }

    fn active(&self) -> MutexGuard<'_, Vec<ActiveRegistration>> {
        lock_active(&self.active)
    }

    /// Register, reporting only success or failure
    ///
    /// Never errors: the cause of a failure is logged.
    pub async fn register(&self, address: &str, descriptor: &ServiceDescriptor) -> RegisterStatus {
        match self.register_instance(address, descriptor).await {
            Ok(registration) => {
                info!(
                    service_name = %registration.service_name(),
                    instance_id = %registration.instance_id(),
                    ensemble = %address,
                    "Service registered"
                );
                RegisterStatus::Success
            }
            Err(e) => {
                error!(
                    service_name = %descriptor.service_name(),
                    ensemble = %address,
                    error = %e,
                    "Failed registering service"
                );
                RegisterStatus::Fail
            }
        }
    }

    /// Register and return the published instance
    ///
    /// # Errors
    /// `InvalidDescriptor`, `HostResolutionFailed`, `ConnectionFailed`, or a
    /// coordination error from publishing. On error no session is left open.
    #[instrument(skip(self, address, descriptor), fields(service_name = %descriptor.service_name(), ensemble = %address))]
    pub async fn register_instance(
        &self,
        address: &str,
        descriptor: &ServiceDescriptor,
    ) -> RegistryResult<Registration> {
        descriptor.validate()?;
        if self.reregister_interval_ms == 0 {
            return Err(CoordError::invalid_options(
                "reregister_interval_ms",
                "must be positive",
            )
            .into());
        }
        let host = self.resolver.resolve().await?;

        let mut record = InstanceRecord {
            name: descriptor.service_name().to_string(),
            id: String::new(),
            address: host.advertised_address(),
            port: Some(descriptor.port()),
            ssl_port: None,
            payload: serde_json::Value::String(descriptor.payload()),
            registration_time_utc: 0,
            service_type: ServiceType::Dynamic,
            uri_spec: Some(UriSpec::parse(URI_SPEC_DEFAULT)),
        };
        let (client, instance_path) = self.publisher.publish_new(address, &mut record).await?;

        let handle = RegistrationHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let registration = Registration {
            handle,
            ensemble: address.to_string(),
            path: instance_path,
            record,
        };

        let client = Arc::new(client);
        let stop = CancellationToken::new();
        self.active().push(ActiveRegistration {
            registration: registration.clone(),
            client: client.clone(),
            watcher: stop.clone(),
        });

        let watcher = ExpiryWatcher {
            handle,
            address: address.to_string(),
            publisher: self.publisher.clone(),
            active: Arc::downgrade(&self.active),
            stop,
            retry_interval_ms: self.reregister_interval_ms,
        };
        tokio::spawn(watcher.run(client));

        Ok(registration)
    }

    /// Tear down the most recent registration
    ///
    /// Returns false when nothing is registered.
    pub fn unregister(&self) -> bool {
        let popped = self.active().pop();
        match popped {
            Some(active) => {
                Self::release(active);
                true
            }
            None => false,
        }
    }

    /// Tear down one registration
    ///
    /// Returns false when the handle is unknown or already released.
    pub fn unregister_handle(&self, handle: RegistrationHandle) -> bool {
        let removed = {
            let mut active = self.active();
            active
                .iter()
                .position(|a| a.registration.handle == handle)
                .map(|idx| active.remove(idx))
        };
        match removed {
            Some(active) => {
                Self::release(active);
                true
            }
            None => false,
        }
    }

    /// Tear down every registration, most recent first
    pub fn unregister_all(&self) -> usize {
        let drained: Vec<ActiveRegistration> = std::mem::take(&mut *self.active());
        let count = drained.len();
        for active in drained.into_iter().rev() {
            Self::release(active);
        }
        count
    }

    fn release(active: ActiveRegistration) {
        active.release();
        info!(
            service_name = %active.registration.service_name(),
            instance_id = %active.registration.instance_id(),
            ensemble = %active.registration.ensemble,
            "Service unregistered"
        );
    }

    /// Number of live registrations
    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    /// Snapshot of live registrations, oldest first
    pub fn registrations(&self) -> Vec<Registration> {
        self.active()
            .iter()
            .map(|a| a.registration.clone())
            .collect()
    }
}

impl Drop for RegistrationManager {
    fn drop(&mut self) {
        for active in std::mem::take(&mut *self.active()) {
            active.release();
        }
    }
}
