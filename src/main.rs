use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wgfleet::agent::HttpConnector;
use wgfleet::cli::{format_config_summary, Cli, Commands, ServeArgs};
use wgfleet::config::{default_config_path, load_config_file, FleetConfig, ValidationSeverity};
use wgfleet::fleet::FleetService;
use wgfleet::messaging::telegram::TelegramMessenger;
use wgfleet::messaging::{LogMessenger, Messenger};
use wgfleet::server::{create_router, AppState};
use wgfleet::store::MemoryStore;
use wgfleet::worker::{
    ExpirationJob, HealthMonitor, HttpProbe, NotificationJob, PeerCountJob, ProvisioningJob,
    ScheduledWorker, WorkerManager,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let result = match &cli.command {
        Commands::Serve(args) => serve(&cli, args).await,
        Commands::Validate => validate(&cli),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<FleetConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    load_config_file(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn validate(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    let result = config.validate();
    println!("{}", format_config_summary(&config, &result));
    if !result.passed {
        bail!("Configuration is invalid");
    }
    Ok(())
}

async fn serve(cli: &Cli, args: &ServeArgs) -> Result<()> {
    // Load .env before the config so the token override sees it
    if let Some(ref env_file) = args.env_file {
        dotenvy::from_path(env_file)
            .with_context(|| format!("Failed to load env file {}", env_file.display()))?;
    }

    let config = load(cli)?;
    let result = config.validate();
    if !result.passed {
        println!("{}", format_config_summary(&config, &result));
        bail!("Refusing to start with an invalid configuration");
    }
    for warning in result.messages.iter().filter(|m| m.severity == ValidationSeverity::Warning) {
        warn!("{}: {}", warning.code, warning.message);
    }

    let store = Arc::new(MemoryStore::with_nodes(config.nodes.clone()));
    let connector = Arc::new(HttpConnector::new(config.agent.client_config()));
    let fleet = Arc::new(FleetService::new(store.clone(), store.clone(), connector));

    let messenger: Arc<dyn Messenger> = match config.telegram.token.as_deref() {
        Some(token) => Arc::new(
            TelegramMessenger::new(config.telegram.api_base.clone(), token)
                .context("Failed to build Telegram client")?,
        ),
        None => {
            warn!("No bot token configured; messages will only be logged");
            Arc::new(LogMessenger::new())
        }
    };

    let w = &config.workers;
    let probe = HttpProbe::new(w.health_timeout()).context("Failed to build health probe")?;
    let health = Arc::new(HealthMonitor::new(
        store.clone(),
        Arc::new(probe),
        messenger.clone(),
        config.admins.clone(),
    ));

    let mut manager = WorkerManager::new();
    manager.add(Arc::new(ScheduledWorker::new(
        ExpirationJob::new(store.clone(), fleet.clone()),
        w.expiration_schedule()?,
    )));
    manager.add(Arc::new(ScheduledWorker::new(
        NotificationJob::with_thresholds(store.clone(), messenger.clone(), w.notify_days.clone()),
        w.notification_schedule()?,
    )));
    manager.add(Arc::new(ScheduledWorker::from_arc(
        health.clone(),
        w.health_schedule(),
    )));
    manager.add(Arc::new(ScheduledWorker::new(
        ProvisioningJob::new(store.clone(), fleet.clone(), messenger.clone()),
        w.provisioning_schedule(),
    )));
    if w.peer_count_enabled {
        manager.add(Arc::new(ScheduledWorker::new(
            PeerCountJob::new(store.clone(), fleet.clone()),
            w.peer_count_schedule(),
        )));
    }
    let manager = Arc::new(manager);

    info!(
        "Loaded {} nodes, starting workers: {}",
        config.nodes.len(),
        manager.names().join(", ")
    );
    if let Err(e) = manager.start().await {
        if let Err(stop_err) = manager.stop().await {
            error!("{}", stop_err);
        }
        fleet.close().await;
        return Err(e.into());
    }

    // Status API runs until the shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let bind_addr = args.status_addr.clone().or_else(|| config.status.bind_addr.clone());
    let server = match bind_addr {
        Some(addr) => {
            let state = AppState::new(store.clone(), manager.clone()).with_health(health.clone());
            let app = create_router(state);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind status API to {}", addr))?;

            info!("Status API listening on {}", addr);
            info!("Endpoints:");
            info!("  GET  /health           - Liveness");
            info!("  GET  /v1/nodes         - Eligible nodes");
            info!("  GET  /v1/nodes/health  - Node health");
            info!("  GET  /v1/workers       - Worker status");

            Some(tokio::spawn(async move {
                let shutdown = async move {
                    let _ = shutdown_rx.changed().await;
                };
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    error!("Status API error: {}", e);
                }
            }))
        }
        None => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("Shutting down");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = server {
        let _ = handle.await;
    }

    let stopped = manager.stop().await;
    fleet.close().await;
    stopped?;

    info!("Shutdown complete");
    Ok(())
}
