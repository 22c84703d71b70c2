//! Relay configuration
//!
//! Plain serde structures with defaults; the CLI layers files, environment
//! and flags on top of them. Every section tolerates missing keys.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PushlinkError, Result};
use crate::identity::IdentityStore;

/// Port the notification listener uses unless told otherwise
pub const DEFAULT_NOTIFICATION_PORT: u16 = 23045;

/// Largest reassembled unit accepted from a phone
pub const DEFAULT_MAX_UNIT_BYTES: usize = 16 * 1024 * 1024;

// ----------------------------------------------------------------------------
// Top Level
// ----------------------------------------------------------------------------

/// Complete relay configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushlinkConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
    pub limits: LimitsConfig,
}

impl PushlinkConfig {
    /// Reject values that would only fail later at bind or dispatch time
    pub fn validate(&self) -> Result<()> {
        if self.network.handshake_timeout_ms == 0 {
            return Err(PushlinkError::config_error(
                "network.handshake_timeout_ms must be greater than zero",
            ));
        }
        if self.network.notification_port != 0
            && self.network.pairing_port == Some(self.network.notification_port)
        {
            return Err(PushlinkError::config_error(format!(
                "network.pairing_port and network.notification_port are both {}",
                self.network.notification_port
            )));
        }
        if self.dispatch.max_in_flight == 0 {
            return Err(PushlinkError::config_error(
                "dispatch.max_in_flight must be at least 1",
            ));
        }
        if let Some(command) = &self.dispatch.command {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(PushlinkError::config_error(
                    "dispatch.command needs a program as its first element",
                ));
            }
        }
        if self.limits.max_unit_bytes < 1024 {
            return Err(PushlinkError::config_error(
                "limits.max_unit_bytes must be at least 1024",
            ));
        }
        Ok(())
    }

    /// Identity store at the configured or default location
    pub fn identity_store(&self) -> Result<IdentityStore> {
        match &self.storage.base_dir {
            Some(dir) => Ok(IdentityStore::new(dir.clone())),
            None => Ok(IdentityStore::open_default()?),
        }
    }
}

// ----------------------------------------------------------------------------
// Sections
// ----------------------------------------------------------------------------

/// Listening sockets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address both listeners bind to
    pub bind_address: IpAddr,
    /// Port for encrypted notifications; 0 picks an ephemeral port
    pub notification_port: u16,
    /// Port for pairing; unset picks an ephemeral port
    pub pairing_port: Option<u16>,
    /// Deadline for a peer to complete the Noise handshake
    pub handshake_timeout_ms: u64,
}

impl NetworkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            notification_port: DEFAULT_NOTIFICATION_PORT,
            pairing_port: None,
            handshake_timeout_ms: 5_000,
        }
    }
}

/// Where keys and trust records live
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory; defaults to the platform configuration directory
    pub base_dir: Option<PathBuf>,
}

/// How received notifications are shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Template for the displayed title
    pub title_format: String,
    /// Template for the displayed body
    pub body_format: String,
    /// Program and arguments run for every notification. `{title}`,
    /// `{body}` and `{image}` are substituted per argument.
    pub command: Option<Vec<String>>,
    /// Concurrent presentation workers before messages are dropped
    pub max_in_flight: usize,
    /// Start with presentation turned on
    pub enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            title_format: "{title}".to_string(),
            body_format: "{body}".to_string(),
            command: None,
            max_in_flight: 32,
            enabled: true,
        }
    }
}

/// Resource limits for peer input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_unit_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_unit_bytes: DEFAULT_MAX_UNIT_BYTES,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
