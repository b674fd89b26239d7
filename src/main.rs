use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rpc_gateway::config::Config;
use rpc_gateway::server::{self, AdminApi};
use rpc_gateway::target::Target;
use rpc_gateway::{FailoverProxy, HealthcheckManager};

/// rpc-gateway — failover reverse proxy for RPC endpoints
#[derive(Parser)]
#[command(name = "rpc-gateway", version, about)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: String,

    /// Override listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<String>,

    /// Admin listen address for /healthz and /metrics
    #[arg(long, default_value = "0.0.0.0:9090")]
    admin_listen: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    tracing::info!("rpc-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load and validate configuration
    tracing::info!(config = cli.config, "Loading configuration");
    let mut config = Config::from_file(&cli.config).await?;
    if let Some(listen) = &cli.listen {
        config.proxy.listen = listen.clone();
    }
    config.validate()?;

    let targets: Vec<Target> = config.targets.iter().map(Target::from_config).collect();
    tracing::info!(targets = targets.len(), "Targets configured");

    let manager = Arc::new(HealthcheckManager::new(
        targets,
        config.health_checks.clone(),
    ));
    let proxy = Arc::new(FailoverProxy::new(&config, manager.clone()));

    // One token cancels probers and both listeners
    let token = CancellationToken::new();
    manager.start(token.clone());

    let admin_listener = TcpListener::bind(&cli.admin_listen).await?;
    let admin = Arc::new(AdminApi::new(manager.clone(), proxy.metrics()));
    tokio::spawn(server::run_admin(admin_listener, admin, token.clone()));

    let listener = TcpListener::bind(&config.proxy.listen).await?;

    tokio::select! {
        result = server::run(listener, proxy, token.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            token.cancel();
        }
    }

    Ok(())
}
