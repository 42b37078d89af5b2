//! Upload/broadcast window gate.
//!
//! Exits 0 when the current local time is inside, just before, or just after one of
//! today's FREE2UP windows for this node, and 1 otherwise. When a window is about to
//! open the gate sleeps until it does.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use slotkeeper::{
    config::Config,
    ingestor::{load_snapshot, parse_entries, ScheduleCache},
    observability::init_tracing,
    sources::create_source,
    window::{is_within_grace, GraceDecision},
};

#[derive(Parser)]
#[command(name = "slotkeeper-gate")]
#[command(version)]
#[command(about = "Check whether an upload/broadcast window is open for this node")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SLOTKEEPER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fetch the remote schedule first instead of trusting the snapshot
    #[arg(long)]
    refresh: bool,

    /// Report a pending window as not permitted instead of waiting for it
    #[arg(long)]
    no_wait: bool,

    /// Log level (overrides logging.level)
    #[arg(short = 'v', long, env = "SLOTKEEPER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(log_level, config.logging.format)?;

    let node_id = config.node_id();
    let rows = if cli.refresh {
        let source = create_source(&config.schedule)?;
        let mut cache = ScheduleCache::new(
            source,
            node_id.clone(),
            config.schedule.snapshot_path.clone(),
            config.schedule.refresh_interval,
            config.schedule.force_refresh_interval,
        );
        if let Err(e) = cache.refresh(false).await {
            warn!("Schedule refresh failed, using snapshot: {}", e);
            cache.load_local();
        }
        cache.rows().to_vec()
    } else {
        load_snapshot(&config.schedule.snapshot_path, &node_id)
    };
    let entries = parse_entries(&rows);

    let now = Local::now().naive_local();
    let decision = is_within_grace(
        &entries,
        now,
        config.gate.grace_before,
        config.gate.grace_after,
    );

    let permitted = match decision {
        GraceDecision::Active { end } => {
            info!("FREE2UP window open until {}", end.format("%H:%M:%S"));
            true
        }
        GraceDecision::Pending { opens_in } if cli.no_wait => {
            info!(
                "FREE2UP window opens in {}, not waiting",
                humantime::format_duration(opens_in)
            );
            false
        }
        GraceDecision::Pending { opens_in } => {
            info!(
                "FREE2UP window opens in {}, waiting",
                humantime::format_duration(opens_in)
            );
            tokio::time::sleep(opens_in).await;
            info!("FREE2UP window open");
            true
        }
        GraceDecision::RecentlyEnded { ended_ago } => {
            info!(
                "FREE2UP window ended {} ago, within tolerance",
                humantime::format_duration(ended_ago)
            );
            true
        }
        GraceDecision::NotPermitted => {
            info!("No FREE2UP window for {} near {}", node_id, now.format("%H:%M:%S"));
            false
        }
    };

    Ok(if permitted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
