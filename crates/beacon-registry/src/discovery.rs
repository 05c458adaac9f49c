//! Discovery query engine
//!
//! TigerStyle: No caching; every call is a fresh read on a fresh session.
//!
//! Each public query opens its own short-lived coordination session with the
//! retry-forever policy, performs its reads and closes the session before
//! returning. Callers needing a hard deadline wrap calls in a timeout or
//! attach a cancellation token.

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{InstanceRecord, ServiceInstance};
use beacon_coord::{path, ClientOptions, CoordError, CoordinationClient, RetryPolicy};
use beacon_core::{NAMESPACE_PATH_DEFAULT, SESSION_TIMEOUT_MS_DEFAULT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A per-service failure during a bulk query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub service_name: String,
    pub reason: String,
}

/// Point-in-time snapshot of every service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryView {
    /// Instances per service name, names in sorted order
    pub services: BTreeMap<String, Vec<ServiceInstance>>,
    /// Services whose instance listing failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<QueryFailure>,
}

impl DiscoveryView {
    /// Whether every service was read successfully
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total instances across services
    pub fn instance_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }

    /// Instances of one service (empty if absent)
    pub fn instances(&self, service_name: &str) -> &[ServiceInstance] {
        self.services
            .get(service_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Queries registered services on one ensemble
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    address: String,
    namespace_path: String,
    policy: RetryPolicy,
    session_timeout_ms: u64,
    cancel: Option<CancellationToken>,
}

impl DiscoveryEngine {
    /// Engine with production defaults
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            namespace_path: NAMESPACE_PATH_DEFAULT.to_string(),
            policy: RetryPolicy::discovery(),
            session_timeout_ms: SESSION_TIMEOUT_MS_DEFAULT,
            cancel: None,
        }
    }

    /// Use a different namespace root
    pub fn with_namespace(mut self, namespace_path: impl Into<String>) -> Self {
        self.namespace_path = namespace_path.into();
        self
    }

    /// Use a different retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a cancellation token to every query
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn namespace_path(&self) -> &str {
        &self.namespace_path
    }

    async fn open(&self) -> RegistryResult<CoordinationClient> {
        let mut options = ClientOptions::default().with_session_timeout_ms(self.session_timeout_ms);
        if let Some(cancel) = &self.cancel {
            options = options.with_cancellation(cancel.clone());
        }
        Ok(CoordinationClient::connect_with(&self.address, self.policy.clone(), options).await?)
    }

    /// Names of every registered service, sorted
    #[instrument(skip(self), fields(ensemble = %self.address))]
    pub async fn list_service_names(&self) -> RegistryResult<Vec<String>> {
        let client = self.open().await?;
        let names = self.names_on(&client).await;
        client.close();
        names
    }

    /// Live instances of one service
    #[instrument(skip(self), fields(ensemble = %self.address))]
    pub async fn query_instances(&self, service_name: &str) -> RegistryResult<Vec<ServiceInstance>> {
        let client = self.open().await?;
        let instances = self.instances_on(&client, service_name).await;
        client.close();
        instances
    }

    /// Live instances of every service
    ///
    /// A service whose listing fails contributes no instances and is recorded
    /// in `failures`; only failing to list names fails the whole call.
    #[instrument(skip(self), fields(ensemble = %self.address))]
    pub async fn query_all_instances(&self) -> RegistryResult<DiscoveryView> {
        let client = self.open().await?;
        let view = self.view_on(&client).await;
        client.close();
        view
    }

    async fn view_on(&self, client: &CoordinationClient) -> RegistryResult<DiscoveryView> {
        let mut view = DiscoveryView::default();
        for name in self.names_on(client).await? {
            match self.instances_on(client, &name).await {
                Ok(instances) => {
                    view.services.insert(name, instances);
                }
                Err(RegistryError::Coordination(CoordError::Cancelled)) => {
                    return Err(CoordError::Cancelled.into());
                }
                Err(e) => {
                    warn!(service_name = %name, error = %e, "Failed querying service instances");
                    view.failures.push(QueryFailure {
                        service_name: name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(
            services = view.services.len(),
            instances = view.instance_count(),
            failures = view.failures.len(),
            "Discovery snapshot taken"
        );
        Ok(view)
    }

    async fn names_on(&self, client: &CoordinationClient) -> RegistryResult<Vec<String>> {
        match client.children(&self.namespace_path).await {
            Ok(names) => Ok(names),
            Err(CoordError::NoNode { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn instances_on(
        &self,
        client: &CoordinationClient,
        service_name: &str,
    ) -> RegistryResult<Vec<ServiceInstance>> {
        let service_path = path::join(&self.namespace_path, service_name)?;
        let ids = match client.children(&service_path).await {
            Ok(ids) => ids,
            Err(CoordError::NoNode { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut instances = Vec::with_capacity(ids.len());
        for id in ids {
            let instance_path = path::join(&service_path, &id)?;
            let data = match client.get_data(&instance_path).await {
                Ok(data) => data,
                // Removed between listing and reading
                Err(CoordError::NoNode { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            match InstanceRecord::from_bytes(&data) {
                Ok(record) => instances.push(ServiceInstance::from_record(&record)),
                Err(e) => {
                    warn!(path = %instance_path, error = %e, "Skipping unreadable instance record");
                }
            }
        }
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_coord::{CreateMode, MemoryEnsemble};

    async fn seed(ensemble: &MemoryEnsemble, service: &str, id: &str) {
        let client = CoordinationClient::connect(ensemble.address(), RetryPolicy::forever(1))
            .await
            .unwrap();
        let service_path = format!("/zk-srv-discovery/{}", service);
        client.ensure_path(&service_path).await.unwrap();
        let record = format!(
            r#"{{"name":"{}","id":"{}","address":"h 1.2.3.4","port":80,"payload":"[v] []","registrationTimeUTC":0}}"#,
            service, id
        );
        client
            .create(
                &format!("{}/{}", service_path, id),
                record.as_bytes(),
                CreateMode::Persistent,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_namespace() {
        let ensemble = MemoryEnsemble::new();
        let engine = DiscoveryEngine::new(ensemble.address());

        assert!(engine.list_service_names().await.unwrap().is_empty());
        assert!(engine.query_instances("nothing").await.unwrap().is_empty());
        let view = engine.query_all_instances().await.unwrap();
        assert!(view.services.is_empty());
        assert!(view.is_complete());
    }

    #[tokio::test]
    async fn test_sessions_are_closed_after_each_call() {
        let ensemble = MemoryEnsemble::new();
        seed(&ensemble, "svc", "1").await;
        let engine = DiscoveryEngine::new(ensemble.address());

        engine.list_service_names().await.unwrap();
        engine.query_instances("svc").await.unwrap();
        engine.query_all_instances().await.unwrap();

        assert!(ensemble.live_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_record_is_skipped() {
        let ensemble = MemoryEnsemble::new();
        seed(&ensemble, "svc", "good").await;

        let client = CoordinationClient::connect(ensemble.address(), RetryPolicy::forever(1))
            .await
            .unwrap();
        client
            .create("/zk-srv-discovery/svc/bad", b"not json", CreateMode::Persistent)
            .await
            .unwrap();

        let engine = DiscoveryEngine::new(ensemble.address());
        let instances = engine.query_instances("svc").await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, "good");
    }

    #[tokio::test]
    async fn test_partial_failure_is_accumulated() {
        let ensemble = MemoryEnsemble::new();
        seed(&ensemble, "broken", "1").await;
        seed(&ensemble, "good", "1").await;
        ensemble.inject_read_fault("/zk-srv-discovery/broken");

        let engine = DiscoveryEngine::new(ensemble.address());
        let view = engine.query_all_instances().await.unwrap();

        assert_eq!(view.instances("good").len(), 1);
        assert!(view.instances("broken").is_empty());
        assert!(!view.services.contains_key("broken"));
        assert!(!view.is_complete());
        assert_eq!(view.failures.len(), 1);
        assert_eq!(view.failures[0].service_name, "broken");

        // A direct query surfaces the error instead
        assert!(engine.query_instances("broken").await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let ensemble = MemoryEnsemble::new();
        ensemble.stop();
        let cancel = CancellationToken::new();
        let engine = DiscoveryEngine::new(ensemble.address()).with_cancellation(cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        assert_eq!(
            engine.query_all_instances().await,
            Err(RegistryError::Coordination(CoordError::Cancelled))
        );
    }
}
