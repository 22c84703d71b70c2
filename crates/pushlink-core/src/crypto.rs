//! Cryptographic primitives for pushlink
//!
//! Thin wrappers around the desktop's static X25519 key pair and the two Noise
//! handshakes the relay speaks:
//! - notifications use `IK`: the phone already knows the desktop key from
//!   pairing, so the desktop learns the phone's static key from the very first
//!   message and can refuse it before replying;
//! - pairing uses `NN`: the channel is encrypted but unauthenticated, trust is
//!   granted by the operator.

use core::fmt;

use snow::{Builder, HandshakeState, TransportState};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::types::{PublicKey, KEY_LEN};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Noise pattern for the notification channel
pub const NOTIFICATION_PATTERN: &str = "Noise_IK_25519_ChaChaPoly_SHA256";

/// Noise pattern for the pairing channel
pub const PAIRING_PATTERN: &str = "Noise_NN_25519_ChaChaPoly_SHA256";

/// Largest Noise message, handshake or transport
pub const MAX_NOISE_MESSAGE: usize = 65535;

/// AEAD tag appended to every transport message
pub const NOISE_TAG_LEN: usize = 16;

// ----------------------------------------------------------------------------
// Key Pair
// ----------------------------------------------------------------------------

/// Long-term X25519 key pair of this desktop installation
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rand_core::OsRng))
    }

    /// Rebuild a key pair from stored secret bytes
    pub fn from_secret_bytes(secret: [u8; KEY_LEN]) -> Self {
        Self::from_secret(StaticSecret::from(secret))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::new(X25519PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_bytes(&self) -> [u8; KEY_LEN] {
        self.secret.to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Noise Protocol Handshake
// ----------------------------------------------------------------------------

/// Noise Protocol handshake state
pub struct NoiseHandshake {
    state: HandshakeState,
}

impl fmt::Debug for NoiseHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseHandshake")
            .field("state", &"<HandshakeState>")
            .finish()
    }
}

impl NoiseHandshake {
    /// Phone side of the notification handshake
    pub fn notification_initiator(local: &KeyPair, remote: &PublicKey) -> Result<Self, snow::Error> {
        let secret = local.secret_bytes();
        let state = Builder::new(NOTIFICATION_PATTERN.parse()?)
            .local_private_key(&secret)
            .remote_public_key(remote.as_bytes())
            .build_initiator()?;

        Ok(Self { state })
    }

    /// Desktop side of the notification handshake
    pub fn notification_responder(local: &KeyPair) -> Result<Self, snow::Error> {
        let secret = local.secret_bytes();
        let state = Builder::new(NOTIFICATION_PATTERN.parse()?)
            .local_private_key(&secret)
            .build_responder()?;

        Ok(Self { state })
    }

    /// Phone side of the pairing handshake
    pub fn pairing_initiator() -> Result<Self, snow::Error> {
        let state = Builder::new(PAIRING_PATTERN.parse()?).build_initiator()?;
        Ok(Self { state })
    }

    /// Desktop side of the pairing handshake
    pub fn pairing_responder() -> Result<Self, snow::Error> {
        let state = Builder::new(PAIRING_PATTERN.parse()?).build_responder()?;
        Ok(Self { state })
    }

    /// Write handshake message
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, snow::Error> {
        let mut output = vec![0u8; MAX_NOISE_MESSAGE];
        let len = self.state.write_message(payload, &mut output)?;
        output.truncate(len);
        Ok(output)
    }

    /// Read handshake message
    pub fn read_message(&mut self, input: &[u8]) -> Result<Vec<u8>, snow::Error> {
        let mut output = vec![0u8; MAX_NOISE_MESSAGE];
        let len = self.state.read_message(input, &mut output)?;
        output.truncate(len);
        Ok(output)
    }

    /// Check if handshake is complete
    pub fn is_handshake_finished(&self) -> bool {
        self.state.is_handshake_finished()
    }

    /// Remote static key, once the pattern has revealed it
    pub fn remote_static(&self) -> Option<PublicKey> {
        self.state
            .get_remote_static()
            .and_then(|key| PublicKey::from_slice(key).ok())
    }

    /// Convert to transport mode
    pub fn into_transport_mode(self) -> Result<NoiseTransport, snow::Error> {
        let state = self.state.into_transport_mode()?;
        Ok(NoiseTransport { state })
    }
}

// ----------------------------------------------------------------------------
// Noise Protocol Transport
// ----------------------------------------------------------------------------

/// Noise Protocol transport state for encrypted communication
pub struct NoiseTransport {
    state: TransportState,
}

impl fmt::Debug for NoiseTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseTransport")
            .field("state", &"<TransportState>")
            .finish()
    }
}

impl NoiseTransport {
    /// Encrypt a message
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, snow::Error> {
        let mut ciphertext = vec![0u8; plaintext.len() + NOISE_TAG_LEN];
        let len = self.state.write_message(plaintext, &mut ciphertext)?;
        ciphertext.truncate(len);
        Ok(ciphertext)
    }

    /// Decrypt a message
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, snow::Error> {
        let mut plaintext = vec![0u8; ciphertext.len()];
        let len = self.state.read_message(ciphertext, &mut plaintext)?;
        plaintext.truncate(len);
        Ok(plaintext)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
