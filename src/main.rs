//! The scanfleet worker binary.
//!
//! Loads the backend config, applies the logging configuration, verifies
//! the coordinator is reachable, then runs one worker to retirement. A
//! supervisor is expected to restart the process, which is also how
//! config and rule changes are picked up.

use scanfleet::{
    retry_async, BackendConfig, Coordinator, LogFormat, LoggingConfig, RedisCoordinator,
    RetryConfig, Worker, DEFAULT_CONFIG_PATH,
};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "scanfleet-worker",
    about = "Backend worker for the scanfleet scanning fleet"
)]
struct Args {
    /// Path to the backend config document.
    #[arg(long, value_name = "PATH")]
    worker_config: Option<PathBuf>,
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi);

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let path = args
        .worker_config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = BackendConfig::load(&path)
        .with_context(|| format!("loading worker config from {}", path.display()))?;

    let logging = config.logging().context("loading logging config")?;
    init_logging(&logging);

    tracing::info!(config = %path.display(), "scanfleet worker starting");

    let coordinator = RedisCoordinator::connect(&config.coordinator)
        .await
        .with_context(|| format!("connecting to coordinator at {}", config.coordinator.addr))?;

    retry_async(&RetryConfig::default(), || coordinator.ping())
        .await
        .with_context(|| {
            format!("coordinator at {} did not answer ping", config.coordinator.addr)
        })?;

    tracing::info!(
        coordinator = %config.coordinator.addr,
        max_files = config.limits.max_files,
        time_to_live = config.limits.time_to_live,
        "coordinator reachable; entering lease loop"
    );

    let mut worker =
        Worker::from_config(config, Arc::new(coordinator)).context("building worker")?;
    let handled = worker.run().await;

    tracing::info!(requests = handled, "worker retired");
    Ok(())
}
