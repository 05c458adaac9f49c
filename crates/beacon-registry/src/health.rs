//! Health/status probe
//!
//! Maps "is a session to the ensemble connected within the blocking timeout"
//! onto `IMOK` / `NO CONNECTION`. No partial states.

use beacon_coord::{ClientOptions, CoordinationClient, RetryPolicy};
use beacon_core::{STATUS_BLOCK_TIMEOUT_MS_DEFAULT, STATUS_CONNECTED, STATUS_NOT_CONNECTED};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ensemble connectivity as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Session established
    ImOk,
    /// Ensemble stopped or unreachable within the timeout
    NoConnection,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImOk => STATUS_CONNECTED,
            Self::NoConnection => STATUS_NOT_CONNECTED,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::ImOk)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Probes connectivity to one ensemble
#[derive(Debug, Clone)]
pub struct HealthProbe {
    address: String,
    timeout: Duration,
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl HealthProbe {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_millis(STATUS_BLOCK_TIMEOUT_MS_DEFAULT),
            policy: RetryPolicy::discovery(),
            cancel: None,
        }
    }

    /// Blocking timeout for the handshake
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a session, wait up to the timeout, close it
    pub async fn status(&self) -> Status {
        let mut options = ClientOptions::default();
        if let Some(cancel) = &self.cancel {
            options = options.with_cancellation(cancel.clone());
        }

        let client =
            match CoordinationClient::connect_with(&self.address, self.policy.clone(), options)
                .await
            {
                Ok(client) => client,
                Err(e) => {
                    debug!(ensemble = %self.address, error = %e, "Status probe could not connect");
                    return Status::NoConnection;
                }
            };

        let connected = client.is_connected(self.timeout).await;
        client.close();

        let status = if connected {
            Status::ImOk
        } else {
            Status::NoConnection
        };
        debug!(ensemble = %self.address, %status, "Status probed");
        status
    }
}
