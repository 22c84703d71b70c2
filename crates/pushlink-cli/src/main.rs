//! pushlink - receive phone notifications on the desktop

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pushlink_cli::{cli::Cli, commands::CommandDispatcher, config::ConfigLoader, error::Result};
use pushlink_core::PushlinkConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let config = load_configuration(&cli).context("could not load configuration")?;
    debug!(?config, "Configuration loaded");

    CommandDispatcher::execute(cli, config).await?;
    info!("pushlink exited");
    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` wins when set
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn load_configuration(cli: &Cli) -> Result<PushlinkConfig> {
    let mut loader = ConfigLoader::new(cli.overrides());
    if let Some(path) = &cli.config {
        info!("Loading configuration from: {}", path.display());
        loader = loader.with_file(path);
    }
    loader.load()
}
