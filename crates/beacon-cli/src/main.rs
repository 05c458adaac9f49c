//! Beacon CLI
//!
//! TigerStyle: Command-line tools for Beacon with explicit error handling.
//!
//! `register` runs a producer: it advertises one instance until interrupted.
//! The other commands query the ensemble directly, without a server.

mod producer;

use anyhow::{bail, Context, Result};
use beacon_core::config::{ENV_SRV_VERSION, ENV_ZK_ADDRESS};
use beacon_core::{init_telemetry, TelemetryConfig, STATUS_BLOCK_TIMEOUT_MS_DEFAULT};
use beacon_registry::{
    format, DiscoveryEngine, HealthProbe, MediaType, RegistrationManager, ServiceDescriptor,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use producer::ProducerArgs;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default upper bound on one discovery command (milliseconds)
const QUERY_TIMEOUT_MS_DEFAULT: u64 = 10 * 1000;

/// Beacon CLI
#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(about = "Service registration and discovery CLI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Ensemble connect string
    #[arg(long, env = ENV_ZK_ADDRESS, global = true)]
    zk: Option<String>,

    /// Upper bound on one discovery command (milliseconds)
    #[arg(long, default_value_t = QUERY_TIMEOUT_MS_DEFAULT, global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register this host as a service instance until interrupted
    Register(ProducerArgs),

    /// List registered service names
    Services,

    /// Show the live instances of one service
    Instances {
        /// Service name
        service_name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every service and its instances
    All {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the ensemble connection status
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _telemetry = init_telemetry(TelemetryConfig::new("beacon-cli").with_log_level(filter))?;

    let timeout = Duration::from_millis(cli.timeout_ms);
    match cli.command {
        Commands::Register(args) => cmd_register(cli.zk.as_deref(), &args).await,
        Commands::Services => cmd_services(require_zk(&cli.zk)?, timeout).await,
        Commands::Instances { service_name, json } => {
            cmd_instances(require_zk(&cli.zk)?, &service_name, json, timeout).await
        }
        Commands::All { json } => cmd_all(require_zk(&cli.zk)?, json, timeout).await,
        Commands::Health => cmd_health(require_zk(&cli.zk)?).await,
    }
}

fn require_zk(zk: &Option<String>) -> Result<&str> {
    zk.as_deref()
        .context("Ensemble address required: pass --zk or set zk_address")
}

fn probe(zk: &str) -> HealthProbe {
    HealthProbe::new(zk).with_timeout(Duration::from_millis(STATUS_BLOCK_TIMEOUT_MS_DEFAULT))
}

/// Check the ensemble is reachable, then run `query` under `timeout`
async fn guarded<T, F>(zk: &str, timeout: Duration, query: F) -> Result<T>
where
    F: Future<Output = beacon_registry::RegistryResult<T>>,
{
    if !probe(zk).status().await.is_ok() {
        bail!("No connection to ensemble {}", zk);
    }

    debug!(ensemble = %zk, timeout_ms = timeout.as_millis() as u64, "Running discovery query");
    tokio::time::timeout(timeout, query)
        .await
        .with_context(|| format!("Discovery query timed out after {:?}", timeout))?
        .context("Discovery query failed")
}

/// Register and block until Ctrl-C
async fn cmd_register(zk: Option<&str>, args: &ProducerArgs) -> Result<()> {
    let config = args
        .resolve(zk, |key| std::env::var(key).ok())
        .context("Invalid producer configuration")?;
    let descriptor = ServiceDescriptor::from(&config);

    let manager = RegistrationManager::new();
    let registration = match manager.register_instance(&config.zk_address, &descriptor).await {
        Ok(registration) => registration,
        Err(e) => {
            eprintln!("{} {}", "Registration failed:".red().bold(), e);
            bail!("service '{}' was not registered", config.service_name);
        }
    };

    println!(
        "{} '{}' registered as {} on {}",
        "Success!".green().bold(),
        config.service_name,
        registration.instance_id().cyan(),
        config.zk_address
    );
    println!("{}", "Press Ctrl-C to unregister and exit.".dimmed());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let removed = manager.unregister_all();
    println!(
        "{} {} registration(s) removed.",
        "Unregistered.".yellow().bold(),
        removed
    );
    Ok(())
}

/// List service names
async fn cmd_services(zk: &str, timeout: Duration) -> Result<()> {
    let engine = DiscoveryEngine::new(zk);
    let names = guarded(zk, timeout, engine.list_service_names()).await?;

    if names.is_empty() {
        println!("{}", "No services registered.".dimmed());
        return Ok(());
    }

    println!("{} ({} total)", "Services".bold(), names.len());
    println!("{}", "-".repeat(40));
    for name in &names {
        println!("  {}", name.cyan());
    }
    Ok(())
}

/// Show one service's instances
async fn cmd_instances(zk: &str, service_name: &str, json: bool, timeout: Duration) -> Result<()> {
    let engine = DiscoveryEngine::new(zk);
    let instances = guarded(zk, timeout, engine.query_instances(service_name)).await?;

    if json {
        println!("{}", format::instances_json(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!(
            "{}",
            format!("No live instances of '{}'.", service_name).dimmed()
        );
        return Ok(());
    }

    println!("{}", format::header_row().bold());
    println!("{}", format::separator_row());
    print!("{}", format::instance_table(&instances));
    Ok(())
}

/// Show every service
async fn cmd_all(zk: &str, json: bool, timeout: Duration) -> Result<()> {
    let engine = DiscoveryEngine::new(zk);
    let view = guarded(zk, timeout, engine.query_all_instances()).await?;

    let media_type = if json {
        MediaType::ApplicationJson
    } else {
        MediaType::TextPlain
    };
    let srv_version = std::env::var(ENV_SRV_VERSION).ok();
    let rendered = format::render_view(&view, media_type, zk, srv_version.as_deref())?;
    print!("{}", rendered);
    if json {
        println!();
    }

    for failure in &view.failures {
        eprintln!(
            "{} {}: {}",
            "Warning:".yellow().bold(),
            failure.service_name,
            failure.reason
        );
    }
    Ok(())
}

/// Show connection status
async fn cmd_health(zk: &str) -> Result<()> {
    let status = probe(zk).status().await;
    if status.is_ok() {
        println!("{} {}", "Status:".bold(), status.as_str().green());
        Ok(())
    } else {
        println!("{} {}", "Status:".bold(), status.as_str().red());
        bail!("ensemble {} is not reachable", zk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_coord::MemoryEnsemble;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_cli_parses_discovery_commands() {
        let cli = Cli::try_parse_from(["beacon", "--zk", "zk1:2181", "instances", "Worker_1"])
            .unwrap();
        assert_eq!(cli.zk.as_deref(), Some("zk1:2181"));
        assert!(matches!(
            cli.command,
            Commands::Instances { ref service_name, json: false } if service_name == "Worker_1"
        ));

        let cli = Cli::try_parse_from(["beacon", "all", "--json", "--zk", "zk1:2181"]).unwrap();
        assert!(matches!(cli.command, Commands::All { json: true }));
    }

    #[test]
    fn test_cli_parses_register_flags() {
        let cli = Cli::try_parse_from([
            "beacon",
            "register",
            "--service-name",
            "Worker_1",
            "--port",
            "18005",
            "--service-version",
            "1.0.0",
        ])
        .unwrap();
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.service_name.as_deref(), Some("Worker_1"));
                assert_eq!(args.port, Some(18005));
                assert_eq!(args.service_version.as_deref(), Some("1.0.0"));
                assert!(args.meta.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_require_zk() {
        assert!(require_zk(&None).is_err());
        assert_eq!(require_zk(&Some("zk:1".into())).unwrap(), "zk:1");
    }

    #[tokio::test]
    async fn test_discovery_commands_against_memory_ensemble() {
        let ensemble = MemoryEnsemble::new();
        let zk = ensemble.address();

        cmd_health(zk).await.unwrap();
        cmd_services(zk, TIMEOUT).await.unwrap();
        cmd_instances(zk, "Worker_1", false, TIMEOUT).await.unwrap();
        cmd_all(zk, true, TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_fail_without_connection() {
        let ensemble = MemoryEnsemble::new();
        ensemble.stop();
        let zk = ensemble.address();

        assert!(cmd_health(zk).await.is_err());
        assert!(cmd_services(zk, TIMEOUT).await.is_err());
        assert!(cmd_all(zk, false, TIMEOUT).await.is_err());
    }
}
