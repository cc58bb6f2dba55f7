use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use featurebundle_core::ConfigKind;

#[derive(Parser)]
#[command(name = "featurebundle-manager")]
#[command(about = "Reconcile feature bundles against a stored snapshot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (overrides FEATUREBUNDLE_CONFIG)
    #[arg(short, long, global = true, env = "FEATUREBUNDLE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one reconciliation pass over every control resource
    Reconcile(ReconcileArgs),
    /// List the control resources consuming a configuration object
    Consumers(ConsumersArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
pub struct StateArgs {
    /// JSON snapshot of bundles, parents, configuration objects and clusters
    #[arg(short, long)]
    pub state: PathBuf,
}

#[derive(Args)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Write the resulting snapshot here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only reconcile these control resources
    #[arg(long = "only")]
    pub only: Vec<String>,
}

#[derive(Args)]
pub struct ConsumersArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Object kind (PolicyRole or ConfigMap)
    #[arg(long, value_parser = parse_kind)]
    pub kind: ConfigKind,

    #[arg(long)]
    pub namespace: Option<String>,

    #[arg(long)]
    pub name: String,
}

fn parse_kind(s: &str) -> Result<ConfigKind, String> {
    s.parse().map_err(|e: featurebundle_core::CoreError| e.to_string())
}
