//! Identity management for pushlink
//!
//! Owns the desktop key pair and the set of trusted phones, both persisted as
//! small text records under one base directory:
//! - `server/server.key` and `server/server.key_secret`: this desktop
//! - `clients/<identifier>.key`: one file per trusted peer

pub mod record;
pub mod store;
pub mod trust;

pub use record::KeyRecord;
pub use store::IdentityStore;
pub use trust::{TrustStore, TrustedPeer};
