//! Configuration for Beacon
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.
//!
//! Producers and the discovery server are configured from the environment,
//! read through the binaries' command-line parsers. The variable names are part of the deployment contract and are kept as-is:
//!
//! | Variable       | Used by  | Required |
//! |----------------|----------|----------|
//! | `zk_address`   | both     | yes      |
//! | `service_name` | producer | yes      |
//! | `service_port` | producer | yes      |
//! | `version`      | producer | yes      |
//! | `meta`         | producer | no (defaults to empty) |
//! | `SRV_VERSION`  | server   | no       |
//! | `BEACON_BIND`  | server   | no       |
//! | `BEACON_BASE_PATH` | server | no     |

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Environment variable: ensemble connect string
pub const ENV_ZK_ADDRESS: &str = "zk_address";
/// Environment variable: service name
pub const ENV_SERVICE_NAME: &str = "service_name";
/// Environment variable: service port
pub const ENV_SERVICE_PORT: &str = "service_port";
/// Environment variable: service version
pub const ENV_VERSION: &str = "version";
/// Environment variable: optional metadata
pub const ENV_META: &str = "meta";
/// Legacy spelling of `meta` accepted as a fallback
pub const ENV_META_LEGACY: &str = "meta_data";
/// Environment variable: server build version shown in the service table
pub const ENV_SRV_VERSION: &str = "SRV_VERSION";
/// Environment variable: server bind address
pub const ENV_BIND: &str = "BEACON_BIND";
/// Environment variable: server base path
pub const ENV_BASE_PATH: &str = "BEACON_BASE_PATH";

// =============================================================================
// Producer configuration
// =============================================================================

/// Configuration of a producer process that registers itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Ensemble connect string
    pub zk_address: String,
    /// Service name (grouping key)
    pub service_name: String,
    /// Service port
    pub service_port: u16,
    /// Service version
    pub version: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: String,
}

impl ProducerConfig {
    /// Read the producer configuration through an arbitrary lookup
    ///
    /// Only the port is validated (integer parse); everything else passes
    /// through unchecked.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| Error::missing(key));

        let zk_address = required(ENV_ZK_ADDRESS)?;
        let service_name = required(ENV_SERVICE_NAME)?;
        let service_port = parse_port(ENV_SERVICE_PORT, &required(ENV_SERVICE_PORT)?)?;
        let version = required(ENV_VERSION)?;
        let metadata = lookup(ENV_META)
            .or_else(|| lookup(ENV_META_LEGACY))
            .unwrap_or_default();

        Ok(Self {
            zk_address,
            service_name,
            service_port,
            version,
            metadata,
        })
    }
}

/// Parse a service port, rejecting anything outside 1-65535
pub fn parse_port(field: &str, raw: &str) -> Result<u16> {
    let port: u16 = raw
        .trim()
        .parse()
        .map_err(|e| Error::invalid(field, format!("'{}' is not a valid port: {}", raw, e)))?;

    if port < SERVICE_PORT_MIN {
        return Err(Error::invalid(field, "port must be in 1-65535"));
    }

    Ok(port)
}

// =============================================================================
// Server configuration
// =============================================================================

/// Configuration of the discovery REST server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Ensemble connect string
    pub zk_address: String,

    /// Address to bind the HTTP listener to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Base path the REST resources are mounted under
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Build version shown in the `getAll` preamble
    #[serde(default)]
    pub srv_version: Option<String>,

    /// Namespace path holding the service records
    #[serde(default = "default_namespace_path")]
    pub namespace_path: String,

    /// Blocking timeout of the status probe (milliseconds)
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,
}

fn default_bind_address() -> String {
    SERVER_BIND_ADDRESS_DEFAULT.to_string()
}

fn default_base_path() -> String {
    SERVER_BASE_PATH_DEFAULT.to_string()
}

fn default_namespace_path() -> String {
    NAMESPACE_PATH_DEFAULT.to_string()
}

fn default_status_timeout_ms() -> u64 {
    STATUS_BLOCK_TIMEOUT_MS_DEFAULT
}

impl ServerConfig {
    /// Create a server configuration with defaults for everything but the ensemble
    pub fn new(zk_address: impl Into<String>) -> Self {
        Self {
            zk_address: zk_address.into(),
            bind_address: default_bind_address(),
            base_path: default_base_path(),
            srv_version: None,
            namespace_path: default_namespace_path(),
            status_timeout_ms: default_status_timeout_ms(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.bind_address.contains(':') {
            return Err(Error::invalid(
                "bind_address",
                "must be in host:port format",
            ));
        }

        if !self.base_path.starts_with('/') {
            return Err(Error::invalid("base_path", "must start with '/'"));
        }

        if !self.namespace_path.starts_with('/') || self.namespace_path.len() < 2 {
            return Err(Error::invalid(
                "namespace_path",
                "must be an absolute, non-root path",
            ));
        }

        if self.status_timeout_ms == 0 {
            return Err(Error::invalid("status_timeout_ms", "must be positive"));
        }

        Ok(())
    }

}
