use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use slotkeeper::{
    config::Config,
    errors::SupervisorError,
    ingestor::ScheduleCache,
    job_scheduling::{AgendaRunner, Dispatcher},
    observability::init_tracing,
    sources::create_source,
    supervisor::{FileLivenessStore, InstanceLock, ProcessSupervisor, SysinfoProcessControl},
};

#[derive(Parser)]
#[command(name = "slotkeeper")]
#[command(version)]
#[command(about = "Agenda-driven task scheduler and worker supervisor for capture appliances")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SLOTKEEPER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (overrides logging.level)
    #[arg(short = 'v', long, env = "SLOTKEEPER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(log_level, config.logging.format)?;

    let node_id = config.node_id();
    info!(
        "Starting slotkeeper v{} on node {}",
        env!("CARGO_PKG_VERSION"),
        node_id
    );

    let control = Arc::new(SysinfoProcessControl::new());
    let _instance_lock = match InstanceLock::acquire(
        &config.supervisor.instance_lock_path,
        control.as_ref(),
    ) {
        Ok(lock) => Some(lock),
        Err(e @ SupervisorError::InstanceLocked { .. }) => return Err(e.into()),
        Err(e) => {
            warn!("Running without an instance lock: {}", e);
            None
        }
    };

    let source = create_source(&config.schedule)?;
    let mut cache = ScheduleCache::new(
        source,
        node_id,
        config.schedule.snapshot_path.clone(),
        config.schedule.refresh_interval,
        config.schedule.force_refresh_interval,
    );
    cache.load_local();

    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::new(FileLivenessStore::new(config.supervisor.liveness_dir.clone())),
        control,
        &config.supervisor,
    ));
    let dispatcher = Dispatcher::new(supervisor, &config);
    let runner = AgendaRunner::new(cache, dispatcher, &config.scheduler);

    let cancellation_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancellation_token.clone()));

    if let Err(e) = runner.run(cancellation_token).await {
        error!("Agenda runner failed: {}", e);
        return Err(e);
    }

    info!("slotkeeper stopped");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down after the current iteration"),
        _ = terminate => info!("Received SIGTERM, shutting down after the current iteration"),
    }
    token.cancel();
}
