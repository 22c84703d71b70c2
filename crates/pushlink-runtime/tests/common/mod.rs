//! Shared helpers for relay integration tests

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pushlink_core::config::PushlinkConfig;
use pushlink_core::{IdentityStore, PresentationError};
use pushlink_runtime::{Presentation, PresentationSink};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub const WAIT: Duration = Duration::from_secs(5);

/// What the sink saw, copied out before the presentation is dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub peer: String,
    pub title: String,
    pub body: String,
    pub image: Option<(PathBuf, Vec<u8>)>,
}

/// Forwards every presentation to the test
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Received>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Received>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

#[async_trait]
impl PresentationSink for ChannelSink {
    async fn present(&self, presentation: &Presentation) -> Result<(), PresentationError> {
        let image = match &presentation.image {
            Some(image) => Some((image.path().to_path_buf(), std::fs::read(image.path())?)),
            None => None,
        };
        let _ = self.sender.send(Received {
            peer: presentation.peer.to_string(),
            title: presentation.title.clone(),
            body: presentation.body.clone(),
            image,
        });
        Ok(())
    }
}

/// Loopback-only configuration with ephemeral ports and a scratch store
pub fn test_config(base_dir: &std::path::Path) -> PushlinkConfig {
    let mut config = PushlinkConfig::default();
    config.network.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.network.notification_port = 0;
    config.network.pairing_port = Some(0);
    config.network.handshake_timeout_ms = 2_000;
    config.storage.base_dir = Some(base_dir.to_path_buf());
    config
}

pub fn store_for(config: &PushlinkConfig) -> IdentityStore {
    config.identity_store().unwrap()
}

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

pub async fn next_received(receiver: &mut mpsc::UnboundedReceiver<Received>) -> Received {
    timeout(WAIT, receiver.recv())
        .await
        .expect("notification should be presented in time")
        .expect("sink channel closed")
}

/// True when nothing arrives within a short grace period
pub async fn nothing_received(receiver: &mut mpsc::UnboundedReceiver<Received>) -> bool {
    timeout(Duration::from_millis(300), receiver.recv()).await.is_err()
}
