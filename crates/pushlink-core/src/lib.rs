//! pushlink core
//!
//! Key material, the Noise channel and its wire format, the on-disk identity
//! store and the configuration types shared by the relay runtime and CLI.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod identity;
pub mod message;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{PendingSession, SecureChannel};
pub use config::PushlinkConfig;
pub use crypto::KeyPair;
pub use errors::{
    BindCause, BindError, ChannelError, PresentationError, ProtocolFramingError, PushlinkError,
    Result, StorageError,
};
pub use identity::{IdentityStore, KeyRecord, TrustStore, TrustedPeer};
pub use message::{NotificationMessage, PairingRequest, PairingResponse};
pub use types::{Fingerprint, PeerIdentifier, PublicKey};
