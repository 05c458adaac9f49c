//! Beacon Server
//!
//! Standalone discovery server binary. Registers itself with the ensemble it
//! serves, then answers REST queries until interrupted.

use beacon_core::config::{ENV_BASE_PATH, ENV_BIND, ENV_SRV_VERSION, ENV_ZK_ADDRESS};
use beacon_core::{
    init_telemetry, ServerConfig, TelemetryConfig, SERVER_BASE_PATH_DEFAULT,
    SERVER_BIND_ADDRESS_DEFAULT, SERVER_SERVICE_NAME, SERVER_SERVICE_VERSION,
    STATUS_BLOCK_TIMEOUT_MS_DEFAULT,
};
use beacon_registry::{RegistrationManager, ServiceDescriptor};
use beacon_server::{api, AppState, QUERY_TIMEOUT_MS_DEFAULT};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};

/// Beacon server CLI
#[derive(Parser, Debug)]
#[command(name = "beacon-server")]
#[command(about = "Service discovery REST server")]
#[command(version)]
struct Cli {
    /// Ensemble connect string
    #[arg(long, env = ENV_ZK_ADDRESS)]
    zk: String,

    /// Bind address
    #[arg(short, long, env = ENV_BIND, default_value = SERVER_BIND_ADDRESS_DEFAULT)]
    bind: String,

    /// Base path the resources are mounted under
    #[arg(long, env = ENV_BASE_PATH, default_value = SERVER_BASE_PATH_DEFAULT)]
    base_path: String,

    /// Build version shown in the service table preamble
    #[arg(long, env = ENV_SRV_VERSION)]
    srv_version: Option<String>,

    /// Blocking timeout of the status probe (milliseconds)
    #[arg(long, default_value_t = STATUS_BLOCK_TIMEOUT_MS_DEFAULT)]
    status_timeout_ms: u64,

    /// Upper bound on one discovery query (milliseconds)
    #[arg(long, default_value_t = QUERY_TIMEOUT_MS_DEFAULT)]
    query_timeout_ms: u64,

    /// Do not register the server itself
    #[arg(long)]
    no_register: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn server_config(&self) -> beacon_core::Result<ServerConfig> {
        let mut config = ServerConfig::new(&self.zk);
        config.bind_address = self.bind.clone();
        config.base_path = self.base_path.clone();
        config.srv_version = self.srv_version.clone();
        config.status_timeout_ms = self.status_timeout_ms;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env("beacon-server");
    match cli.verbose {
        0 => {}
        1 => telemetry = telemetry.with_log_level("debug"),
        _ => telemetry = telemetry.with_log_level("trace"),
    }
    let _telemetry = init_telemetry(telemetry)?;

    let config = cli.server_config()?;
    info!(
        zk_address = %config.zk_address,
        srv_version = config.srv_version.as_deref().unwrap_or("null"),
        "Running zk-srv-discovery"
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let local_addr = listener.local_addr()?;

    let registrar = self_registrar(&config);
    if cli.no_register {
        info!("Self-registration disabled");
    } else {
        let descriptor =
            ServiceDescriptor::new(SERVER_SERVICE_NAME, local_addr.port(), SERVER_SERVICE_VERSION);
        if !registrar
            .register(&config.zk_address, &descriptor)
            .await
            .is_success()
        {
            warn!("Self-registration failed, serving anyway");
        }
    }

    let state =
        AppState::with_query_timeout(config, Duration::from_millis(cli.query_timeout_ms));
    let app = api::router(state);

    info!(%local_addr, "Server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registrar.unregister_all();
    info!("Server stopped");
    Ok(())
}

/// Manager for the server's own registration, under the namespace it serves
fn self_registrar(config: &ServerConfig) -> RegistrationManager {
    RegistrationManager::new().with_namespace(&config.namespace_path)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_from_args() {
        let cli = Cli::parse_from([
            "beacon-server",
            "--zk",
            "mem://cfg",
            "--bind",
            "127.0.0.1:9090",
            "--base-path",
            "/api",
        ]);
        let config = cli.server_config().unwrap();
        assert_eq!(config.zk_address, "mem://cfg");
        assert_eq!(config.bind_address, "127.0.0.1:9090");
        assert_eq!(config.base_path, "/api");
    }

    #[test]
    fn test_server_config_rejects_bad_base_path() {
        let cli = Cli::parse_from(["beacon-server", "--zk", "mem://cfg", "--base-path", "api"]);
        assert!(cli.server_config().is_err());
    }

    #[test]
    fn test_self_registrar_uses_configured_namespace() {
        let mut config = ServerConfig::new("mem://cfg");
        config.namespace_path = "/custom/root".into();
        assert_eq!(self_registrar(&config).namespace_path(), "/custom/root");
    }
}
