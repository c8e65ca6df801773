//! flexd: the flexgrid daemon.
//!
//! Loads the cluster configuration, registers every configured cluster
//! with its initial worker nodes, and runs the rebalancer until Ctrl-C.
//!
//! Nothing in this process calls `Rebalancer::confirm_scaling`: there is no
//! launcher reporting back when a flex completes. Each flex therefore holds
//! its cluster's lock until the stale-lock watchdog releases it after
//! `rebalancer.lock_timeout`, which also acts as the cool-down between
//! flexes of one cluster. The watchdog logs each release at warn.
//!
//! # Usage
//!
//! ```text
//! flexd run --config /etc/flexgrid/flexd.toml
//! flexd check --config /etc/flexgrid/flexd.toml
//! ```

mod bootstrap;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use flexgrid_autoscale::{Rebalancer, RegistryScaler};
use flexgrid_core::{FlexConfig, parse_duration};
use flexgrid_metrics::ResourceManagerClient;
use flexgrid_state::TaskRegistry;

#[derive(Parser)]
#[command(name = "flexd", about = "flexgrid cluster rebalancer daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register configured clusters and run the rebalancer.
    Run {
        /// Path to flexd.toml.
        #[arg(long, default_value = "flexd.toml")]
        config: PathBuf,

        /// Override the configured tick interval, e.g. "10s".
        #[arg(long)]
        interval: Option<String>,
    },
    /// Validate a configuration file and print what it would register.
    Check {
        /// Path to flexd.toml.
        #[arg(long, default_value = "flexd.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let default_filter: tracing_subscriber::EnvFilter = "info,flexd=debug,flexgrid=debug".parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or(default_filter))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, interval } => run(config, interval).await,
        Command::Check { config } => check(config),
    }
}

async fn run(config_path: PathBuf, interval: Option<String>) -> anyhow::Result<()> {
    let config = FlexConfig::from_file(&config_path)?;
    let interval = match interval {
        Some(raw) => parse_duration(&raw)
            .filter(|d| !d.is_zero())
            .ok_or_else(|| anyhow::anyhow!("--interval: invalid duration {raw:?}"))?,
        None => config.rebalancer.interval()?,
    };
    let metrics_timeout = config.rebalancer.metrics_timeout()?;
    let scale_timeout = config.rebalancer.scale_timeout()?;
    let lock_timeout = config.rebalancer.lock_timeout()?;

    info!(config = %config_path.display(), "flexd starting");

    // ── Registry ───────────────────────────────────────────────

    let registry = TaskRegistry::new();
    let framework_id = format!("flexgrid-{}", uuid::Uuid::new_v4());
    registry.set_framework_id(framework_id.clone());
    info!(%framework_id, "framework registered");

    let registered = bootstrap::register_clusters(&registry, &config)?;
    info!(clusters = registered, tasks = registry.task_count(), "clusters registered");

    // ── Rebalancer ─────────────────────────────────────────────

    let metrics = Arc::new(ResourceManagerClient::new(metrics_timeout));
    let scaler = Arc::new(RegistryScaler::new(registry.clone()).with_profiles(config.profiles()));
    let rebalancer = Rebalancer::new(registry.clone(), metrics, scaler)
        .with_metrics_timeout(metrics_timeout)
        .with_scale_timeout(scale_timeout)
        .with_lock_timeout(lock_timeout);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rebalance_handle = tokio::spawn(async move {
        rebalancer.run(interval, shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = rebalance_handle.await;

    info!("flexd stopped");
    Ok(())
}

fn check(config_path: PathBuf) -> anyhow::Result<()> {
    let config = FlexConfig::from_file(&config_path)?;

    println!("config ok: {}", config_path.display());
    println!(
        "rebalancer: interval={} metrics_timeout={} scale_timeout={} lock_timeout={}",
        config.rebalancer.interval,
        config.rebalancer.metrics_timeout,
        config.rebalancer.scale_timeout,
        config.rebalancer.lock_timeout
    );
    for profile in config.profiles() {
        println!(
            "profile {}: cpus={} memory_mb={}",
            profile.name, profile.cpus, profile.memory_mb
        );
    }
    for cluster in &config.clusters {
        println!(
            "cluster {}: rm={}:{} min_quota={} initial_nodes={} profile={}",
            cluster.id,
            cluster.resource_manager_host,
            cluster.resource_manager_port,
            cluster.min_quota,
            cluster.initial_nodes,
            cluster.profile
        );
    }
    Ok(())
}
