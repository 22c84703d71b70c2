//! Phone side of both protocols
//!
//! Talks to a relay the way a paired phone would; the integration tests
//! drive both listeners through it.

use std::net::SocketAddr;

use pushlink_core::channel::{self, SecureChannel};
use pushlink_core::config::DEFAULT_MAX_UNIT_BYTES;
use pushlink_core::{
    ChannelError, KeyPair, NotificationMessage, PairingRequest, PairingResponse, PeerIdentifier,
    PublicKey, PushlinkError,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// A phone identity able to pair and push notifications
#[derive(Debug, Clone)]
pub struct PeerClient {
    keypair: KeyPair,
    max_unit: usize,
}

impl PeerClient {
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            keypair,
            max_unit: DEFAULT_MAX_UNIT_BYTES,
        }
    }

    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    /// Ask the relay at `address` to trust this key under `identifier`
    pub async fn pair(
        &self,
        address: SocketAddr,
        identifier: &PeerIdentifier,
    ) -> Result<PairingResponse, PushlinkError> {
        let stream = TcpStream::connect(address).await.map_err(ChannelError::from)?;
        let mut channel = channel::connect_pairing(stream, self.max_unit).await?;

        let request = PairingRequest {
            identifier: identifier.clone(),
            public_key: *self.public_key(),
        };
        channel.send_parts(&request.to_parts()).await?;

        let parts = channel.recv_parts().await?.ok_or(ChannelError::PeerClosed)?;
        Ok(PairingResponse::from_parts(parts)?)
    }

    /// Open an authenticated notification channel to the relay
    pub async fn connect(
        &self,
        address: SocketAddr,
        desktop_public_key: &PublicKey,
    ) -> Result<NotificationSender, ChannelError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let channel =
            channel::connect_notification(stream, &self.keypair, desktop_public_key, self.max_unit).await?;
        Ok(NotificationSender { channel })
    }
}

/// Open notification channel
#[derive(Debug)]
pub struct NotificationSender {
    channel: SecureChannel<TcpStream>,
}

impl NotificationSender {
    pub async fn send(&mut self, message: NotificationMessage) -> Result<(), ChannelError> {
        self.channel.send_parts(&message.into_parts()).await
    }

    /// Send raw parts, valid or not
    pub async fn send_parts<P: AsRef<[u8]>>(&mut self, parts: &[P]) -> Result<(), ChannelError> {
        self.channel.send_parts(parts).await
    }

    /// Close the write side; the relay sees a clean end of stream
    pub async fn close(self) -> Result<(), ChannelError> {
        let mut stream = self.channel.into_inner();
        stream.shutdown().await?;
        Ok(())
    }
}
