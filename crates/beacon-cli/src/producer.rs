//! Producer configuration
//!
//! TigerStyle: Flags win over the environment; validation stays in
//! `ProducerConfig` so both sources are checked the same way.

use beacon_core::config::{
    ENV_META, ENV_SERVICE_NAME, ENV_SERVICE_PORT, ENV_VERSION, ENV_ZK_ADDRESS,
};
use beacon_core::ProducerConfig;
use clap::Args;

/// Producer values given on the command line
#[derive(Args, Debug, Clone, Default)]
pub struct ProducerArgs {
    /// Service name (env: service_name)
    #[arg(long)]
    pub service_name: Option<String>,

    /// Service port (env: service_port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Service version (env: version)
    #[arg(long)]
    pub service_version: Option<String>,

    /// Free-form metadata (env: meta)
    #[arg(long)]
    pub meta: Option<String>,
}

impl ProducerArgs {
    fn flag(&self, zk_address: Option<&str>, key: &str) -> Option<String> {
        match key {
            ENV_ZK_ADDRESS => zk_address.map(str::to_string),
            ENV_SERVICE_NAME => self.service_name.clone(),
            ENV_SERVICE_PORT => self.port.map(|port| port.to_string()),
            ENV_VERSION => self.service_version.clone(),
            ENV_META => self.meta.clone(),
            _ => None,
        }
    }

    /// Build the producer configuration, falling back to `env` per value
    pub fn resolve<F>(&self, zk_address: Option<&str>, env: F) -> beacon_core::Result<ProducerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        ProducerConfig::from_lookup(|key| self.flag(zk_address, key).or_else(|| env(key)))
    }
}
