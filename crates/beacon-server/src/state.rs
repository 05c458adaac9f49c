//! Server state
//!
//! TigerStyle: Immutable shared state; every request opens its own sessions.

use beacon_core::ServerConfig;
use beacon_registry::{DiscoveryEngine, HealthProbe};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on one discovery query made on behalf of a request
pub const QUERY_TIMEOUT_MS_DEFAULT: u64 = 10 * 1000;

/// Server-wide shared state
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    config: ServerConfig,
    engine: DiscoveryEngine,
    probe: HealthProbe,
    query_timeout: Duration,
}

impl AppState {
    /// Create state for a validated configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_query_timeout(config, Duration::from_millis(QUERY_TIMEOUT_MS_DEFAULT))
    }

    /// Create state with an explicit per-request query timeout
    pub fn with_query_timeout(config: ServerConfig, query_timeout: Duration) -> Self {
        let engine =
            DiscoveryEngine::new(&config.zk_address).with_namespace(&config.namespace_path);
        let probe = HealthProbe::new(&config.zk_address)
            .with_timeout(Duration::from_millis(config.status_timeout_ms));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine,
                probe,
                query_timeout,
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &DiscoveryEngine {
        &self.inner.engine
    }

    pub fn probe(&self) -> &HealthProbe {
        &self.inner.probe
    }

    pub fn query_timeout(&self) -> Duration {
        self.inner.query_timeout
    }
}
