//! elastikvd — the elastikv elasticity controller daemon.
//!
//! Single binary that assembles the controller:
//! - Probe listener (workload telemetry over TCP)
//! - Decision engine (filter + PID + feed-forward classifier)
//! - Actuator (single-flight scale-task worker)
//! - Cluster backend (in-memory partition/descriptor bookkeeping)
//!
//! # Usage
//!
//! ```text
//! elastikvd run --listen 0.0.0.0:4444 --report /var/log/elastikv/periods.tsv
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use elastikv_actuator::Actuator;
use elastikv_cluster::InMemoryCluster;
use elastikv_core::AppConfig;
use elastikv_engine::{DecisionEngine, ProbeRegistry};

#[derive(Parser)]
#[command(name = "elastikvd", about = "elastikv elasticity controller")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller.
    Run {
        /// TOML configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address the probe listener binds to.
        #[arg(long, default_value = "0.0.0.0:4444")]
        listen: String,

        /// Period report output path.
        #[arg(long, default_value = "elastikv-periods.tsv")]
        report: PathBuf,

        /// Node count the controller starts from.
        #[arg(long, default_value = "3")]
        initial_nodes: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,elastikvd=debug,elastikv=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            report,
            initial_nodes,
        } => run(config, listen, report, initial_nodes).await,
    }
}

async fn run(
    config: Option<PathBuf>,
    listen: String,
    report: PathBuf,
    initial_nodes: u32,
) -> anyhow::Result<()> {
    info!("elastikv controller starting");

    let cfg = match &config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };

    // ── Assemble subsystems ────────────────────────────────────

    let cluster = Arc::new(InMemoryCluster::new(
        "elastikv",
        cfg.partition.total_partitions,
        cfg.partition.replication_factor,
        initial_nodes,
    ));
    info!(
        partitions = cfg.partition.total_partitions,
        replication = cfg.partition.replication_factor,
        "cluster backend initialized"
    );

    let actuator = Arc::new(Actuator::new(
        cfg.fleet.clone(),
        cluster.clone(),
        initial_nodes,
    ));
    info!(
        min = cfg.fleet.min_nodes,
        max = cfg.fleet.max_nodes,
        initial = initial_nodes,
        "actuator initialized"
    );

    let probes = ProbeRegistry::new();

    let report_file = std::fs::File::create(&report)?;
    info!(path = ?report, "period report opened");

    let mut engine = DecisionEngine::new(
        cfg.control.clone(),
        probes.clone(),
        actuator,
        cluster,
        report_file,
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Probe listener ─────────────────────────────────────────

    let listener = TcpListener::bind(&listen).await?;
    info!(addr = %listen, "probe listener bound");

    let accept_probes = probes.clone();
    let mut accept_shutdown = shutdown_rx.clone();
    let accept_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => accept_probes.add(stream).await,
                    Err(e) => warn!(error = %e, "probe accept failed"),
                },
                _ = accept_shutdown.changed() => return,
            }
        }
    });

    // ── Control loop ───────────────────────────────────────────

    let engine_shutdown = shutdown_rx.clone();
    let engine_handle = tokio::spawn(async move { engine.run(engine_shutdown).await });

    // Graceful shutdown on Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = accept_handle.await;
    engine_handle.await??;

    info!("elastikv controller stopped");
    Ok(())
}
