//! Messages exchanged over the notification and pairing channels
//!
//! Each message knows how to build itself from the decoded parts of a unit
//! and how to turn itself back into parts. Any shape other than the ones
//! listed here is a [`ProtocolFramingError`].

use crate::errors::ProtocolFramingError;
use crate::types::{PeerIdentifier, PublicKey};

// ----------------------------------------------------------------------------
// Notification
// ----------------------------------------------------------------------------

/// A notification pushed by the phone: title, body and an optional image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub image: Option<Vec<u8>>,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    /// Parse `[title, body]` or `[title, body, image]`
    pub fn from_parts(parts: Vec<Vec<u8>>) -> Result<Self, ProtocolFramingError> {
        if parts.len() != 2 && parts.len() != 3 {
            return Err(ProtocolFramingError::UnexpectedArity {
                expected: "2 or 3",
                actual: parts.len(),
            });
        }

        let mut parts = parts.into_iter();
        let title = utf8_part(parts.next(), "title")?;
        let body = utf8_part(parts.next(), "body")?;
        let image = parts.next();

        Ok(Self { title, body, image })
    }

    pub fn into_parts(self) -> Vec<Vec<u8>> {
        let mut parts = vec![self.title.into_bytes(), self.body.into_bytes()];
        if let Some(image) = self.image {
            parts.push(image);
        }
        parts
    }
}

// ----------------------------------------------------------------------------
// Pairing Request
// ----------------------------------------------------------------------------

/// A phone asking to be trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    pub identifier: PeerIdentifier,
    pub public_key: PublicKey,
}

impl PairingRequest {
    /// Parse `[identifier, public key hex]`
    pub fn from_parts(parts: Vec<Vec<u8>>) -> Result<Self, ProtocolFramingError> {
        if parts.len() != 2 {
            return Err(ProtocolFramingError::UnexpectedArity {
                expected: "2",
                actual: parts.len(),
            });
        }

        let mut parts = parts.into_iter();
        let identifier = PeerIdentifier::new(utf8_part(parts.next(), "identifier")?)?;
        let public_key = utf8_part(parts.next(), "public key")?.parse()?;

        Ok(Self {
            identifier,
            public_key,
        })
    }

    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        vec![
            self.identifier.as_str().as_bytes().to_vec(),
            self.public_key.to_hex().into_bytes(),
        ]
    }
}

// ----------------------------------------------------------------------------
// Pairing Response
// ----------------------------------------------------------------------------

/// Desktop answer to a pairing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingResponse {
    /// Trusted; connect to `notification_port` using `desktop_public_key`
    Accepted {
        notification_port: u16,
        desktop_public_key: PublicKey,
    },
    /// Operator declined
    Rejected,
}

impl PairingResponse {
    /// Accepted: `[port as text, desktop key hex]`; rejected: one empty part
    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        match self {
            PairingResponse::Accepted {
                notification_port,
                desktop_public_key,
            } => vec![
                notification_port.to_string().into_bytes(),
                desktop_public_key.to_hex().into_bytes(),
            ],
            PairingResponse::Rejected => vec![Vec::new()],
        }
    }

    pub fn from_parts(parts: Vec<Vec<u8>>) -> Result<Self, ProtocolFramingError> {
        match parts.len() {
            1 if parts[0].is_empty() => Ok(PairingResponse::Rejected),
            2 => {
                let mut parts = parts.into_iter();
                let port_text = utf8_part(parts.next(), "port")?;
                let notification_port = port_text
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolFramingError::InvalidPort(port_text.clone()))?;
                let desktop_public_key = utf8_part(parts.next(), "public key")?.parse()?;

                Ok(PairingResponse::Accepted {
                    notification_port,
                    desktop_public_key,
                })
            }
            actual => Err(ProtocolFramingError::UnexpectedArity {
                expected: "1 empty or 2",
                actual,
            }),
        }
    }
}

fn utf8_part(part: Option<Vec<u8>>, name: &'static str) -> Result<String, ProtocolFramingError> {
    let bytes = part.ok_or(ProtocolFramingError::Truncated)?;
    String::from_utf8(bytes).map_err(|_| ProtocolFramingError::InvalidUtf8(name))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
