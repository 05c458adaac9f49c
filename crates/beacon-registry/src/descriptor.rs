//! Service descriptors
//!
//! TigerStyle: Validate once at the boundary; immutable afterwards.

use crate::error::{RegistryError, RegistryResult};
use beacon_core::{ProducerConfig, SERVICE_NAME_LENGTH_BYTES_MAX, SERVICE_PORT_MIN};
use serde::{Deserialize, Serialize};

/// What a producer asks to register
///
/// The advertised address is not part of the descriptor: registration always
/// reports the local machine's resolvable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    service_name: String,
    port: u16,
    version: String,
    #[serde(default)]
    metadata: String,
}

impl ServiceDescriptor {
    /// Create a descriptor with empty metadata
    pub fn new(service_name: impl Into<String>, port: u16, version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            port,
            version: version.into(),
            metadata: String::new(),
        }
    }

    /// Set the metadata string
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Grouping key
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Advertised port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Advertised version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Free-form metadata (possibly empty)
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Record payload: `[version] [metadata]`
    pub fn payload(&self) -> String {
        format!("[{}] [{}]", self.version, self.metadata)
    }

    /// Check the descriptor can be published
    pub fn validate(&self) -> RegistryResult<()> {
        if self.service_name.is_empty() {
            return Err(RegistryError::invalid_descriptor(
                "service_name",
                "cannot be empty",
            ));
        }
        if self.service_name.len() > SERVICE_NAME_LENGTH_BYTES_MAX {
            return Err(RegistryError::invalid_descriptor(
                "service_name",
                format!(
                    "length {} exceeds max {}",
                    self.service_name.len(),
                    SERVICE_NAME_LENGTH_BYTES_MAX
                ),
            ));
        }
        if self.service_name.contains('/') || self.service_name == "." || self.service_name == ".."
        {
            return Err(RegistryError::invalid_descriptor(
                "service_name",
                "must be a single path component",
            ));
        }
        if self.service_name.chars().any(char::is_control) {
            return Err(RegistryError::invalid_descriptor(
                "service_name",
                "contains control characters",
            ));
        }
        if self.port < SERVICE_PORT_MIN {
            return Err(RegistryError::invalid_descriptor(
                "port",
                format!("must be at least {}", SERVICE_PORT_MIN),
            ));
        }
        Ok(())
    }
}

impl From<&ProducerConfig> for ServiceDescriptor {
    fn from(config: &ProducerConfig) -> Self {
        Self::new(
            config.service_name.clone(),
            config.service_port,
            config.version.clone(),
        )
        .with_metadata(config.metadata.clone())
    }
}
