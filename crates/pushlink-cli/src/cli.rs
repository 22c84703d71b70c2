//! Command-line interface definitions and parsing

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path, replacing the default search
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the desktop key and trusted phones
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Accept pairing requests and notifications
    Serve(NetworkArgs),
    /// Only accept pairing requests
    Pair(NetworkArgs),
    /// Only accept notifications from paired phones
    Listen(NetworkArgs),
    /// List trusted phones
    Peers,
    /// Show the desktop public key, creating it on first use
    Identity,
    /// Print the effective configuration as TOML
    Config,
}

/// Socket overrides shared by the listening commands
#[derive(Args, Debug, Default, Clone)]
pub struct NetworkArgs {
    /// Address to bind both listeners to
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Notification port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Pairing port; 0 picks a free one
    #[arg(long)]
    pub pairing_port: Option<u16>,
}

impl Cli {
    /// Values given on the command line, applied over every config source
    pub fn overrides(&self) -> ConfigOverrides {
        let network = match &self.command {
            Commands::Serve(args) | Commands::Pair(args) | Commands::Listen(args) => args.clone(),
            _ => NetworkArgs::default(),
        };
        ConfigOverrides {
            base_dir: self.data_dir.clone(),
            bind_address: network.bind,
            notification_port: network.port,
            pairing_port: network.pairing_port,
        }
    }
}
