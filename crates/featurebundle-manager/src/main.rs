mod cli;
mod dry_run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use featurebundle_controller::config::loader::load_config_with_default_path;
use featurebundle_controller::{
    ControllerConfig, ReconcileRunner, Reconciler, ReferenceIndex, observability,
};
use featurebundle_storage::{InMemoryStore, StoreSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cli::{Cli, Commands, ConsumersArgs, ReconcileArgs};
use dry_run::DryRunDeployer;

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config_with_default_path(cli.config.as_ref()).context("configuration error")?;
    observability::apply_logging_level(&cfg.logging.level);
    info!(
        concurrent_reconciles = cfg.controller.concurrent_reconciles,
        "Configuration loaded"
    );

    match &cli.command {
        Commands::Reconcile(args) => reconcile(&cfg, args).await,
        Commands::Consumers(args) => consumers(&cfg, args).await,
        Commands::Config => {
            let rendered = toml::to_string_pretty(&cfg).context("failed to render configuration")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

async fn load_store(path: &Path) -> Result<Arc<InMemoryStore>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("invalid state file {}", path.display()))?;
    let store = InMemoryStore::from_snapshot(snapshot)
        .await
        .with_context(|| format!("rejected state file {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Runs one pass over the selected control resources. The returned
/// reconciler holds the reference index built during the pass.
async fn run_pass(
    cfg: &ControllerConfig,
    store: Arc<InMemoryStore>,
    only: &[String],
) -> Result<Arc<Reconciler>> {
    let reconciler = Arc::new(
        Reconciler::new(
            store.clone(),
            Arc::new(DryRunDeployer),
            Arc::new(ReferenceIndex::new()),
        )
        .with_settings(cfg.controller.clone()),
    );
    let runner = ReconcileRunner::new(reconciler.clone());

    let names = if only.is_empty() {
        store.bundle_names().await
    } else {
        only.to_vec()
    };
    let cancel = CancellationToken::new();
    let reports = runner.run(names, &cancel).await;

    let mut failures = 0usize;
    for report in &reports {
        match &report.result {
            Ok(outcome) if outcome.is_done() => {
                info!(bundle = %report.name, "Reconciled");
            }
            Ok(outcome) => {
                warn!(
                    bundle = %report.name,
                    failed = ?outcome.failed_features,
                    requeue_after = ?outcome.requeue_delay(),
                    "Reconciled with failures"
                );
            }
            Err(e) => {
                failures += 1;
                warn!(bundle = %report.name, error = %e, "Reconciliation failed");
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} reconciliations failed", reports.len());
    }
    Ok(reconciler)
}

async fn reconcile(cfg: &ControllerConfig, args: &ReconcileArgs) -> Result<()> {
    let store = load_store(&args.state.state).await?;
    run_pass(cfg, store.clone(), &args.only).await?;

    let snapshot = store.snapshot().await;
    let rendered = serde_json::to_string_pretty(&snapshot)?;
    match &args.output {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn consumers(cfg: &ControllerConfig, args: &ConsumersArgs) -> Result<()> {
    let store = load_store(&args.state.state).await?;
    let reconciler = run_pass(cfg, store, &[]).await?;

    let mut names: Vec<String> = reconciler
        .consumers_for_object(args.kind, args.namespace.as_deref(), &args.name)
        .into_iter()
        .collect();
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}
