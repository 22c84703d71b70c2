//! Noise-encrypted multipart channel over a byte stream
//!
//! Handshakes are driven here; the responder side of the notification
//! handshake stops halfway in a [`PendingSession`] so the caller can look at
//! the peer's static key and either [`accept`](PendingSession::accept) it or
//! drop the connection without ever answering.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::crypto::{KeyPair, NoiseHandshake, NoiseTransport};
use crate::errors::ChannelError;
use crate::types::PublicKey;
use crate::wire::{self, UnitAssembler};

// ----------------------------------------------------------------------------
// Secure Channel
// ----------------------------------------------------------------------------

/// Established channel carrying multipart units
#[derive(Debug)]
pub struct SecureChannel<S> {
    stream: S,
    transport: NoiseTransport,
    remote_static: Option<PublicKey>,
    assembler: UnitAssembler,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: S, transport: NoiseTransport, remote_static: Option<PublicKey>, max_unit: usize) -> Self {
        Self {
            stream,
            transport,
            remote_static,
            assembler: UnitAssembler::new(max_unit),
        }
    }

    /// Peer's static key, for channels whose pattern authenticates it
    pub fn remote_static(&self) -> Option<&PublicKey> {
        self.remote_static.as_ref()
    }

    /// Send one multipart unit
    pub async fn send_parts<P: AsRef<[u8]>>(&mut self, parts: &[P]) -> Result<(), ChannelError> {
        let unit = wire::encode_parts(parts);
        for chunk in wire::chunk_unit(&unit) {
            let ciphertext = self.transport.encrypt(&chunk)?;
            wire::write_frame(&mut self.stream, &ciphertext).await?;
        }
        Ok(())
    }

    /// Receive the next encoded unit; `None` when the peer closed cleanly.
    ///
    /// Decode it with [`wire::decode_parts`]. Not cancel safe: a unit that
    /// was partially read is lost if the future is dropped.
    pub async fn recv_unit(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        loop {
            let Some(frame) = wire::read_frame(&mut self.stream).await? else {
                return Ok(None);
            };
            let chunk = self.transport.decrypt(&frame)?;
            if let Some(unit) = self.assembler.push(&chunk)? {
                trace!(bytes = unit.len(), "received unit");
                return Ok(Some(unit));
            }
        }
    }

    /// Receive and decode the next unit into its parts
    pub async fn recv_parts(&mut self) -> Result<Option<Vec<Vec<u8>>>, ChannelError> {
        match self.recv_unit().await? {
            Some(unit) => Ok(Some(wire::decode_parts(&unit)?)),
            None => Ok(None),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

// ----------------------------------------------------------------------------
// Handshake Drivers
// ----------------------------------------------------------------------------

async fn expect_frame<S>(stream: &mut S) -> Result<Vec<u8>, ChannelError>
where
    S: AsyncRead + Unpin,
{
    wire::read_frame(stream).await?.ok_or(ChannelError::PeerClosed)
}

/// Notification handshake after the first message, peer key known
#[derive(Debug)]
pub struct PendingSession<S> {
    stream: S,
    handshake: NoiseHandshake,
    remote: PublicKey,
    max_unit: usize,
}

impl<S> PendingSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Static key the initiator proved possession of
    pub fn remote_static(&self) -> &PublicKey {
        &self.remote
    }

    /// Finish the handshake and open the channel
    pub async fn accept(mut self) -> Result<SecureChannel<S>, ChannelError> {
        let reply = self.handshake.write_message(&[])?;
        wire::write_frame(&mut self.stream, &reply).await?;

        let transport = self.handshake.into_transport_mode()?;
        Ok(SecureChannel::new(self.stream, transport, Some(self.remote), self.max_unit))
    }
}

/// Desktop side: read the phone's first notification handshake message
pub async fn accept_notification<S>(
    mut stream: S,
    local: &KeyPair,
    max_unit: usize,
) -> Result<PendingSession<S>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = NoiseHandshake::notification_responder(local)?;
    let first = expect_frame(&mut stream).await?;
    handshake.read_message(&first)?;

    let remote = handshake
        .remote_static()
        .ok_or(ChannelError::Noise(snow::Error::Input))?;

    Ok(PendingSession {
        stream,
        handshake,
        remote,
        max_unit,
    })
}

/// Phone side of the notification handshake
pub async fn connect_notification<S>(
    mut stream: S,
    local: &KeyPair,
    desktop: &PublicKey,
    max_unit: usize,
) -> Result<SecureChannel<S>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = NoiseHandshake::notification_initiator(local, desktop)?;
    let first = handshake.write_message(&[])?;
    wire::write_frame(&mut stream, &first).await?;

    let reply = expect_frame(&mut stream).await?;
    handshake.read_message(&reply)?;

    let transport = handshake.into_transport_mode()?;
    Ok(SecureChannel::new(stream, transport, Some(*desktop), max_unit))
}

/// Desktop side of the pairing handshake
pub async fn accept_pairing<S>(mut stream: S, max_unit: usize) -> Result<SecureChannel<S>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = NoiseHandshake::pairing_responder()?;
    let first = expect_frame(&mut stream).await?;
    handshake.read_message(&first)?;

    let reply = handshake.write_message(&[])?;
    wire::write_frame(&mut stream, &reply).await?;

    let transport = handshake.into_transport_mode()?;
    Ok(SecureChannel::new(stream, transport, None, max_unit))
}

/// Phone side of the pairing handshake
pub async fn connect_pairing<S>(mut stream: S, max_unit: usize) -> Result<SecureChannel<S>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = NoiseHandshake::pairing_initiator()?;
    let first = handshake.write_message(&[])?;
    wire::write_frame(&mut stream, &first).await?;

    let reply = expect_frame(&mut stream).await?;
    handshake.read_message(&reply)?;

    let transport = handshake.into_transport_mode()?;
    Ok(SecureChannel::new(stream, transport, None, max_unit))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
