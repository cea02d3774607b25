use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opwatch::{build_service, poll_once, OpwatchConfig};

#[derive(Parser, Debug)]
#[command(name = "opwatch")]
#[command(about = "Poll HTTP health endpoints and export their status")]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poll every target once, print the snapshot as JSON and exit
    #[arg(long)]
    once: bool,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "opwatch_core=trace")
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    let config = OpwatchConfig::load(args.config.as_deref())?;
    let service = build_service(&config)?;

    // One-shot mode: nothing is started in the background
    if args.once {
        let snapshot = poll_once(&service).await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let handle = service.start();
    info!(
        nodes = service.registry().len(),
        interval_secs = config.poll_interval_secs,
        "opwatch started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!(
        scans = service.stats().scans(),
        dispatched = service.stats().dispatched(),
        "shutting down"
    );
    handle.shutdown().await?;
    Ok(())
}

/// Logs go to stderr so `--once` output stays valid JSON.
fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}
