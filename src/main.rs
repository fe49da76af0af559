use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use screen_lock_guard::{
    CommandControl, Config, Controller, FeedKind, Policy, StrategyKind, supervisor,
};

#[derive(Debug, Parser)]
#[command(
    name = "screen-lock-guard",
    about = "Keeps the screen locker out of the way while applications inhibit it over D-Bus"
)]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Suppression strategy.
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Where bus traffic is read from.
    #[arg(long, value_enum)]
    feed: Option<FeedKind>,

    /// Seconds between deactivations under the disrupt strategy.
    #[arg(long)]
    interval: Option<u64>,

    /// Logging level (error|warn|info|debug|trace), overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(feed) = args.feed {
        config.feed = feed;
    }
    if let Some(interval) = args.interval {
        config.disrupt_interval_secs = interval;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let shutdown =
        supervisor::shutdown_signal().context("failed to install signal handlers")?;
    let config = load_config(&args)?;
    info!(
        strategy = ?config.strategy,
        feed = ?config.feed,
        interfaces = config.interfaces.len(),
        "starting screen-lock-guard"
    );

    let control = CommandControl::from_config(&config)?;
    let controller = Arc::new(Controller::new(control, config.strategy()));
    let policy = Arc::new(Policy::from_config(&config));

    supervisor::run(controller, policy, config.subscriptions(), shutdown)
        .await
        .context("screen-lock-guard stopped on error")?;
    info!("stopped");
    Ok(())
}
