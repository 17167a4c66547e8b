//! Revwatch - artifact revision watcher
//!
//! Usage:
//!   revwatch run --namespace default --name podinfo   # Watch and converge
//!   revwatch reconcile --namespace default --name podinfo
//!   revwatch fetch --url ... --digest sha256:... --dest ./out
//!   revwatch render --dir ./out
//!   revwatch config

mod polling;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revwatch_core::cluster::{ClusterApi, HttpClusterApi, SourceReader};
use revwatch_core::config::{self, WatcherConfig};
use revwatch_core::controller::{Controller, RequeuePolicy};
use revwatch_core::fetch::ArchiveFetcher;
use revwatch_core::reconcile::{Action, Reconciler};
use revwatch_core::transform::{BundleTransformer, read_entries};
use revwatch_core::types::ObjectRef;

use crate::polling::PollingSource;

#[derive(Parser)]
#[command(name = "revwatch")]
#[command(about = "Converge cluster resources from source-controller artifacts", long_about = None)]
struct Cli {
    /// Path to revwatch.toml (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a source resource and converge on every new revision
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Seconds between polls of the watched resource
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },

    /// Reconcile a source resource once
    Reconcile {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Download, verify and extract an artifact
    Fetch {
        #[arg(long)]
        url: String,

        /// Expected digest, e.g. sha256:<hex>
        #[arg(long)]
        digest: String,

        /// Extraction directory; created if missing
        #[arg(long)]
        dest: PathBuf,
    },

    /// Print the target resources derived from an extracted artifact
    Render {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Namespace of the watched resource
    #[arg(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Name of the watched resource
    #[arg(long)]
    name: String,
}

impl SourceArgs {
    fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.namespace, &self.name)
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revwatch=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { source, interval } => {
            run_controller(&config, source.object_ref(), Duration::from_secs(interval)).await
        }
        Commands::Reconcile { source, format } => {
            run_reconcile(&config, source.object_ref(), format).await
        }
        Commands::Fetch { url, digest, dest } => run_fetch(&config, &url, &digest, &dest).await,
        Commands::Render { dir } => run_render(&config, &dir),
        Commands::Config => {
            print!("{}", config::to_toml(&config)?);
            Ok(())
        }
    }
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(err) => warn!(error = %err, "failed to listen for interrupt"),
        }
        trigger.cancel();
    });
    cancel
}

fn build_reconciler(config: &WatcherConfig) -> Result<(Arc<HttpClusterApi>, Reconciler)> {
    let cluster = Arc::new(
        HttpClusterApi::from_config(&config.cluster).context("Failed to configure cluster access")?,
    );
    let sources: Arc<dyn SourceReader> = cluster.clone();
    let api: Arc<dyn ClusterApi> = cluster.clone();
    let reconciler = Reconciler::from_config(config, sources, api)?;
    Ok((cluster, reconciler))
}

async fn run_controller(config: &WatcherConfig, object: ObjectRef, interval: Duration) -> Result<()> {
    if interval.is_zero() {
        anyhow::bail!("--interval must be at least one second");
    }
    let (cluster, reconciler) = build_reconciler(config)?;
    let cancel = shutdown_token();
    let (tx, rx) = mpsc::channel(16);

    info!(object = %object, interval_secs = interval.as_secs(), "watching source resource");
    let poller = PollingSource::new(cluster, object, interval);
    let polling = tokio::spawn(poller.run(tx, cancel.clone()));

    Controller::new(
        Arc::new(reconciler),
        RequeuePolicy::from_config(&config.controller),
    )
    .run(rx, cancel.clone())
    .await;

    cancel.cancel();
    polling.await.context("Polling task failed")?;
    Ok(())
}

async fn run_reconcile(config: &WatcherConfig, object: ObjectRef, format: OutputFormat) -> Result<()> {
    let (_, reconciler) = build_reconciler(config)?;
    let cancel = shutdown_token();

    let action = reconciler
        .reconcile(&object, &cancel)
        .await
        .with_context(|| format!("Failed to reconcile {}", object))?;

    match format {
        OutputFormat::Table => match action {
            Action::AwaitChange => println!("✓ {} reconciled", object),
            Action::RequeueAfter(delay) => {
                println!("✓ {} reconciled, requeue in {}s", object, delay.as_secs())
            }
        },
        OutputFormat::Json => {
            let output = serde_json::json!({
                "object": object.to_string(),
                "requeueAfterSecs": match action {
                    Action::AwaitChange => None,
                    Action::RequeueAfter(delay) => Some(delay.as_secs()),
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn run_fetch(config: &WatcherConfig, url: &str, digest: &str, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let fetcher = ArchiveFetcher::new(&config.fetch)?;
    let cancel = shutdown_token();

    let summary = fetcher
        .fetch(url, digest, dest, &cancel)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    println!(
        "✓ Extracted {} files ({} bytes) into {}",
        summary.files,
        summary.bytes,
        dest.display()
    );
    Ok(())
}

fn run_render(config: &WatcherConfig, dir: &Path) -> Result<()> {
    let entries =
        read_entries(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    let objects = BundleTransformer::new(config.target.clone()).transform(&entries)?;
    println!("{}", serde_json::to_string_pretty(&objects)?);
    Ok(())
}
