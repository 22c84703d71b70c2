//! Command handlers for the pushlink CLI

use std::sync::Arc;

use pushlink_core::PushlinkConfig;
use pushlink_runtime::{sink_from_config, Components, RunningRelay, Supervisor};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config;
use crate::error::Result;
use crate::output::{self, TerminalAnnouncer};
use crate::prompt::TerminalPrompt;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: PushlinkConfig) -> Result<()> {
        match cli.command {
            Commands::Serve(_) => Self::handle_relay(config, Components::ALL).await,
            Commands::Pair(_) => Self::handle_relay(config, Components::PAIRING_ONLY).await,
            Commands::Listen(_) => Self::handle_relay(config, Components::NOTIFICATIONS_ONLY).await,
            Commands::Peers => Self::handle_peers(&config),
            Commands::Identity => Self::handle_identity(&config),
            Commands::Config => Self::handle_config(&config),
        }
    }

    /// Run the selected listeners until the operator stops the process
    async fn handle_relay(config: PushlinkConfig, components: Components) -> Result<()> {
        let store = config.identity_store()?;
        let sink = sink_from_config(&config.dispatch);

        let relay = Supervisor::new(config, store, sink)
            .with_prompt(Arc::new(TerminalPrompt::new()))
            .with_announcer(Arc::new(TerminalAnnouncer))
            .with_components(components)
            .start()
            .await?;

        for e in relay.bind_errors() {
            warn!(error = %e, "Listener not started");
        }
        if let Some(address) = relay.notification_addr() {
            info!(%address, "Accepting notifications");
        }

        wait_for_shutdown(&relay).await?;
        relay.shutdown().await;
        Ok(())
    }

    fn handle_peers(config: &PushlinkConfig) -> Result<()> {
        let store = config.identity_store()?;
        let peers = store.list_trusted_peers()?;
        println!("{}", output::peer_table(&peers));
        Ok(())
    }

    fn handle_identity(config: &PushlinkConfig) -> Result<()> {
        let store = config.identity_store()?;
        let keypair = store.ensure_identity()?;
        println!("{}", output::identity_summary(keypair.public_key(), store.base_dir()));
        Ok(())
    }

    fn handle_config(config: &PushlinkConfig) -> Result<()> {
        print!("{}", config::render(config)?);
        Ok(())
    }
}

/// Block until Ctrl-C or SIGTERM. SIGUSR1 flips notification display.
#[cfg(unix)]
async fn wait_for_shutdown(relay: &RunningRelay) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut toggle = signal(SignalKind::user_defined1())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("Terminated");
                return Ok(());
            }
            _ = toggle.recv() => {
                let enabled = relay.dispatcher().toggle();
                info!(enabled, "Notification display toggled");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_relay: &RunningRelay) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Interrupted");
    Ok(())
}
