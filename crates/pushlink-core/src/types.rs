//! Core types for pushlink
//!
//! Newtypes validate data that arrives from the network or from disk before
//! it is used as a file name or handed to the Noise layer.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::ProtocolFramingError;

/// Length of an X25519 key in bytes
pub const KEY_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Identifier a peer claims during pairing, usually its network address.
///
/// It names the peer's trust file, so anything that could escape the trust
/// directory is refused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerIdentifier(String);

impl PeerIdentifier {
    /// Maximum identifier length in bytes. The trust record is named
    /// `<identifier>.key` and must stay within the 255 byte file name limit.
    pub const MAX_LEN: usize = 255 - ".key".len();

    pub fn new(value: impl Into<String>) -> Result<Self, ProtocolFramingError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ProtocolFramingError::InvalidIdentifier("empty".into()));
        }
        if value.len() > Self::MAX_LEN {
            return Err(ProtocolFramingError::InvalidIdentifier(format!(
                "{} bytes (max {})",
                value.len(),
                Self::MAX_LEN
            )));
        }
        if value == "." || value == ".." {
            return Err(ProtocolFramingError::InvalidIdentifier(value));
        }
        if value
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
        {
            return Err(ProtocolFramingError::InvalidIdentifier(value.escape_debug().to_string()));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerIdentifier {
    type Err = ProtocolFramingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PeerIdentifier {
    type Error = ProtocolFramingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PeerIdentifier> for String {
    fn from(id: PeerIdentifier) -> Self {
        id.0
    }
}

// ----------------------------------------------------------------------------
// Public Key
// ----------------------------------------------------------------------------

/// X25519 static public key, hex-encoded in text form
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolFramingError> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            ProtocolFramingError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short SHA-256 fingerprint for showing to an operator
    pub fn fingerprint(&self) -> Fingerprint {
        let digest = Sha256::digest(self.0);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl FromStr for PublicKey {
    type Err = ProtocolFramingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| ProtocolFramingError::InvalidPublicKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

// ----------------------------------------------------------------------------
// Fingerprint
// ----------------------------------------------------------------------------

/// SHA-256 of a public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    /// First eight bytes as colon separated hex pairs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0[..8].iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accepts_addresses() {
        assert!(PeerIdentifier::new("192.168.1.20").is_ok());
        assert!(PeerIdentifier::new("fe80::1").is_ok());
        assert!(PeerIdentifier::new("pixel-7").is_ok());
    }

    #[test]
    fn test_identifier_rejects_path_escapes() {
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0byte", "line\nbreak"] {
            assert!(PeerIdentifier::new(bad).is_err(), "accepted {:?}", bad);
        }
        assert!(PeerIdentifier::new("x".repeat(256)).is_err());
    }

    #[test]
    fn test_identifier_length_leaves_room_for_extension() {
        assert_eq!(PeerIdentifier::MAX_LEN, 251);
        assert!(PeerIdentifier::new("a".repeat(251)).is_ok());
        assert!(PeerIdentifier::new("a".repeat(252)).is_err());
        assert!(PeerIdentifier::new("a".repeat(255)).is_err());
    }

    #[test]
    fn test_public_key_hex_parsing() {
        let key = PublicKey::new([0xab; KEY_LEN]);
        let parsed: PublicKey = key.to_hex().parse().unwrap();
        assert_eq!(parsed, key);

        assert!("abcd".parse::<PublicKey>().is_err());
        assert!("zz".repeat(32).parse::<PublicKey>().is_err());
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = PublicKey::new([1; KEY_LEN]).fingerprint();
        let text = fp.to_string();
        assert_eq!(text.len(), 8 * 2 + 7);
        assert_eq!(text.matches(':').count(), 7);
    }
}
