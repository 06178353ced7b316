//! rekon: reconciles workloads from a manifest against an in-memory cluster.
//!
//! Seeds the in-memory store with the manifest's workloads and runs the
//! reconciliation loop for each of them. With `--simulate`, a built-in cluster
//! simulator completes schemas, jobs and rollouts so the workloads converge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rekon::resource::Workload;
use rekon::{
    ClusterSimulator, MemoryStore, ObjectStore, ReconcileConfig, Resource, Runner,
    StandardTemplates,
};

mod manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// rekon reconciliation engine
#[derive(Parser, Debug)]
#[command(name = "rekon", version, about)]
struct Args {
    /// Workload manifest (JSON object or array)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Requeue delay for fast-settling resources, in seconds
    #[arg(long, default_value = "5")]
    settle_delay_secs: u64,

    /// Requeue delay after a deployment rollout, in seconds
    #[arg(long, default_value = "10")]
    rollout_delay_secs: u64,

    /// Retry delay after a failed pass, in seconds
    #[arg(long, default_value = "30")]
    error_backoff_secs: u64,

    /// Poll interval for converged workloads, in seconds
    #[arg(long, default_value = "60")]
    resync_interval_secs: u64,

    /// Run the built-in cluster simulator
    #[arg(long)]
    simulate: bool,

    /// Simulator step interval in milliseconds
    #[arg(long, default_value = "500")]
    simulate_interval_ms: u64,

    /// Exit once every workload has converged
    #[arg(long)]
    exit_when_converged: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            rollout_delay: Duration::from_secs(self.rollout_delay_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "rekon=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let workloads = manifest::load_workloads(&args.manifest).await?;
    info!(
        "Loaded {} workloads from {}",
        workloads.len(),
        args.manifest.display()
    );

    let store = Arc::new(MemoryStore::new());
    let mut keys = Vec::with_capacity(workloads.len());
    for workload in workloads {
        let key = workload.metadata.key();
        store
            .create(workload.into_object())
            .await
            .with_context(|| format!("Failed to seed workload {}", key))?;
        keys.push(key);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let simulator = if args.simulate {
        let sim = ClusterSimulator::new(
            Arc::clone(&store),
            Duration::from_millis(args.simulate_interval_ms),
        );
        Some(tokio::spawn(sim.run(shutdown_rx.clone())))
    } else {
        warn!("Running without --simulate; schemas, jobs and rollouts will not progress");
        None
    };

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            let _ = signal_tx.send(true);
        }
    });

    let runner = Runner::new(
        store.clone(),
        Arc::new(StandardTemplates::new()),
        args.reconcile_config(),
    )
    .exit_when_converged(args.exit_when_converged);
    let summaries = runner.run(keys, shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = simulator {
        let _ = handle.await;
    }

    for summary in &summaries {
        info!(
            "Workload {}: {} passes, {} errors, converged: {}",
            summary.key, summary.passes, summary.errors, summary.converged
        );
        if let Some(workload) = store.peek::<Workload>(&summary.key).await {
            println!("{}", serde_json::to_string_pretty(&workload)?);
        }
    }

    Ok(())
}
