//! pushlink CLI library
//!
//! Argument parsing, layered configuration and the terminal side of the
//! relay: the pairing prompt and announcement, and peer listings.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod prompt;

pub use cli::{Cli, Commands, NetworkArgs};
pub use commands::CommandDispatcher;
pub use config::{ConfigLoader, ConfigOverrides};
pub use error::{CliError, Result};
pub use output::TerminalAnnouncer;
pub use prompt::TerminalPrompt;
