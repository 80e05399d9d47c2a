//! Beacon command line entry point
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use std::sync::Arc;

use anyhow::Context;
use beacon::{
    run_once, BeaconConfig, DiscoveryService, MaintenanceSchedule, MaintenanceScheduler,
    Repositories, StaticProfileProvider,
};
use beacon_common::config::DatabaseBackend;
use beacon_db::{migrations, pool};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

mod clap;

use crate::clap::{Commands, PresenceCommands, WeightsCommands};

fn init_tracing(filter: &str) {
    let filter = match EnvFilter::try_new(filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("It looks like your log filter is invalid ({e}); falling back to \"warn\"");
            EnvFilter::new("warn")
        }
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = clap::parse();

    let mut config = BeaconConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.log.filter = level;
    }
    init_tracing(&config.log.filter);
    info!("🚀 Beacon {} starting", clap::version());

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics.listen)
            .install()
            .context("failed to install the Prometheus exporter")?;
        info!("📊 Metrics exported on {}", config.metrics.listen);
    }

    if args.command == Commands::Migrate {
        return migrate(&config).await;
    }
    if config.database.backend == DatabaseBackend::Memory {
        warn!("⚠️ Using the in-memory backend; state is lost when the process exits");
    }

    let repos = Repositories::open(&config.database).await.context("failed to open storage")?;
    let service = Arc::new(DiscoveryService::from_config(
        &config,
        repos,
        Arc::new(StaticProfileProvider::new()),
    )?);

    match args.command {
        Commands::Run => {
            let mut scheduler = MaintenanceScheduler::new(service.clone(), MaintenanceSchedule::from(&config));
            let report = run_once(&service).await?;
            info!("✅ Startup maintenance: {:?}", report);
            scheduler.start()?;

            tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
            info!("🛑 Shutdown requested");
            scheduler.stop().await;
        }
        Commands::Sweep => {
            let swept = service.broadcasts().sweep_expired().await?;
            println!("Deactivated {swept} expired broadcasts");
        }
        Commands::Purge { days } => {
            let retention = days
                .map(|days| chrono::Duration::days(i64::from(days)))
                .unwrap_or_else(|| config.broadcast.retention());
            let purged = service.broadcasts().purge_old(retention).await?;
            println!("Purged {purged} broadcasts inactive for more than {} days", retention.num_days());
        }
        Commands::Weights { action } => {
            let weights = match action {
                WeightsCommands::Show | WeightsCommands::Validate => service.get_ranking_weights().await?,
                WeightsCommands::Reset => service.reset_ranking_weights().await?,
            };
            let validation = service.validate_ranking_weights(&weights);
            println!("{}", serde_json::to_string_pretty(&weights)?);
            if action == WeightsCommands::Validate {
                println!("{}", serde_json::to_string_pretty(&validation)?);
                if !validation.valid {
                    anyhow::bail!("weights sum to {:.3}, outside [0.95, 1.05]", validation.sum);
                }
            }
        }
        Commands::Presence {
            action: PresenceCommands::Expire,
        } => {
            let expired = service.presence().expire_stale().await?;
            println!("Marked {expired} idle users offline");
        }
        Commands::Migrate => migrate(&config).await?,
    }

    Ok(())
}

async fn migrate(config: &BeaconConfig) -> anyhow::Result<()> {
    if config.database.backend == DatabaseBackend::Memory {
        warn!("⚠️ The in-memory backend has no schema to migrate");
        return Ok(());
    }
    let pool = pool::create_pool(&config.database).await?;
    migrations::run_migrations(&pool).await?;
    info!("✅ Schema is at version {}", migrations::MIGRATION_VERSION);
    Ok(())
}
