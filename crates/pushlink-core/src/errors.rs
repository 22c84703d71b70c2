//! Error types for the pushlink relay
//!
//! Each failure class gets its own enum so callers can decide locally how far
//! it propagates: framing and presentation errors are dropped per message,
//! bind and storage errors stop only the component that hit them.

use std::io;
use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Storage Errors
// ----------------------------------------------------------------------------

/// Failures persisting or reading key material and trust records
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid key record at {}: {reason}", path.display())]
    InvalidRecord { path: PathBuf, reason: String },

    #[error("Key file {} has no secret key; delete it to generate a new identity", path.display())]
    MissingSecret { path: PathBuf },

    #[error("Could not determine the configuration directory")]
    NoConfigDir,
}

impl StorageError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_record(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::InvalidRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Bind Errors
// ----------------------------------------------------------------------------

/// Why a listener could not bind its port
#[derive(Debug, thiserror::Error)]
pub enum BindCause {
    #[error("port is already used")]
    PortInUse,

    #[error("permission denied (use a port > 1023 if you are not root)")]
    PermissionDenied,

    #[error("address is not available on this host")]
    AddressUnavailable,

    #[error("{0}")]
    Other(#[source] io::Error),
}

/// A listener failed to bind
#[derive(Debug, thiserror::Error)]
#[error("Cannot bind {address}: {cause}")]
pub struct BindError {
    pub address: String,
    #[source]
    pub cause: BindCause,
}

impl BindError {
    /// Classify an I/O error returned by `bind`
    pub fn from_io(address: impl Into<String>, err: io::Error) -> Self {
        let cause = match err.kind() {
            io::ErrorKind::AddrInUse => BindCause::PortInUse,
            io::ErrorKind::PermissionDenied => BindCause::PermissionDenied,
            io::ErrorKind::AddrNotAvailable => BindCause::AddressUnavailable,
            _ => BindCause::Other(err),
        };

        BindError {
            address: address.into(),
            cause,
        }
    }

    pub fn is_port_in_use(&self) -> bool {
        matches!(self.cause, BindCause::PortInUse)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.cause, BindCause::PermissionDenied)
    }
}

// ----------------------------------------------------------------------------
// Framing Errors
// ----------------------------------------------------------------------------

/// A received unit did not have the expected shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFramingError {
    #[error("Unexpected part count: expected {expected}, got {actual}")]
    UnexpectedArity { expected: &'static str, actual: usize },

    #[error("Multipart unit truncated")]
    Truncated,

    #[error("Multipart unit has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Empty transport frame")]
    EmptyFrame,

    #[error("Unknown frame flag {0:#04x}")]
    UnknownFlag(u8),

    #[error("Unit of {size} bytes exceeds the {max} byte limit")]
    Oversized { size: usize, max: usize },

    #[error("Part '{0}' is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("Invalid peer identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

// ----------------------------------------------------------------------------
// Channel Errors
// ----------------------------------------------------------------------------

/// Failures on an established or establishing Noise channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Network I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Noise protocol error: {0}")]
    Noise(#[from] snow::Error),

    #[error("Framing error: {0}")]
    Framing(#[from] ProtocolFramingError),

    #[error("Peer closed the connection during the handshake")]
    PeerClosed,

    #[error("Handshake did not complete within {duration_ms}ms")]
    HandshakeTimeout { duration_ms: u64 },
}

impl ChannelError {
    /// Whether the connection has to be torn down after this error.
    ///
    /// A malformed unit is dropped and the session keeps going, except when
    /// the unit blew the size limit: the remaining frames cannot be skipped
    /// reliably.
    pub fn is_fatal(&self) -> bool {
        match self {
            ChannelError::Framing(ProtocolFramingError::Oversized { .. }) => true,
            ChannelError::Framing(_) => false,
            _ => true,
        }
    }
}

// ----------------------------------------------------------------------------
// Presentation Errors
// ----------------------------------------------------------------------------

/// Failures while preparing or displaying a notification
#[derive(Debug, thiserror::Error)]
pub enum PresentationError {
    #[error("Unsupported image data ({0} bytes, unknown format)")]
    UnsupportedImage(usize),

    #[error("Image I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Presentation sink failed: {0}")]
    Sink(String),
}

// ----------------------------------------------------------------------------
// Umbrella Error
// ----------------------------------------------------------------------------

/// Core error type for pushlink
#[derive(Debug, thiserror::Error)]
pub enum PushlinkError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    #[error("Framing error: {0}")]
    Framing(#[from] ProtocolFramingError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Presentation error: {0}")]
    Presentation(#[from] PresentationError),

    #[error("Noise protocol error: {0}")]
    Noise(#[from] snow::Error),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Peer refused the pairing request
    #[error("Pairing request was rejected")]
    PairingRejected,
}

impl PushlinkError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PushlinkError::Configuration {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, PushlinkError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
