//! Local host identity
//!
//! Registration advertises `"<host name> <host address>"` for the machine
//! it runs on.

use crate::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use std::net::IpAddr;
use tracing::debug;

/// Resolved local identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub name: String,
    pub address: IpAddr,
}

impl HostIdentity {
    /// Address string stored in instance records
    pub fn advertised_address(&self) -> String {
        format!("{} {}", self.name, self.address)
    }
}

/// Resolves the local machine's identity
#[async_trait]
pub trait HostResolver: Send + Sync + std::fmt::Debug {
    async fn resolve(&self) -> RegistryResult<HostIdentity>;
}

/// Resolver using the system host name and DNS
#[derive(Debug, Clone, Default)]
pub struct SystemHostResolver;

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn resolve(&self) -> RegistryResult<HostIdentity> {
        let name = hostname::get()
            .map_err(|e| RegistryError::host_resolution(format!("host name lookup: {}", e)))?
            .to_string_lossy()
            .into_owned();

        let addresses: Vec<IpAddr> = tokio::net::lookup_host((name.as_str(), 0))
            .await
            .map_err(|e| RegistryError::host_resolution(format!("resolve {}: {}", name, e)))?
            .map(|sa| sa.ip())
            .collect();

        let address = addresses
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addresses.first())
            .copied()
            .ok_or_else(|| {
                RegistryError::host_resolution(format!("no address for host {}", name))
            })?;

        debug!(host = %name, %address, "Resolved local host");
        Ok(HostIdentity { name, address })
    }
}

/// Resolver returning a fixed identity
#[derive(Debug, Clone)]
pub struct StaticHostResolver {
    identity: HostIdentity,
}

impl StaticHostResolver {
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            identity: HostIdentity {
                name: name.into(),
                address,
            },
        }
    }
}

#[async_trait]
impl HostResolver for StaticHostResolver {
    async fn resolve(&self) -> RegistryResult<HostIdentity> {
        Ok(self.identity.clone())
    }
}
