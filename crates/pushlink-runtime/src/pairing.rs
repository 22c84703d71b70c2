//! Pairing listener
//!
//! Phones that want to be trusted connect here over an unauthenticated Noise
//! `NN` channel and send their identifier and public key. The operator
//! decides through an [`ApprovalPrompt`]; an approved key is written to the
//! trust directory and published to the notification listener *before* the
//! phone learns it was accepted, so its first notification cannot race the
//! trust update.
//!
//! Requests are handled one at a time, inline in the accept loop.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use pushlink_core::channel::{self, SecureChannel};
use pushlink_core::config::PushlinkConfig;
use pushlink_core::{
    BindError, IdentityStore, PairingRequest, PairingResponse, PeerIdentifier, PublicKey, StorageError,
    TrustedPeer,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::approval::{Approval, ApprovalPrompt};
use crate::authorizer::{run_blocking, Authorizer};
use crate::net;
use crate::shutdown::Shutdown;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

/// Progress of the pairing listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingState {
    Starting,
    Listening(SocketAddr),
    RequestReceived(PeerIdentifier),
    AwaitingApproval(PeerIdentifier),
    Approved(PeerIdentifier),
    Rejected(PeerIdentifier),
    Stopped,
}

/// Everything a phone needs to start pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingAnnouncement {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Address reachable from the LAN
    pub local_ip: IpAddr,
    pub desktop_public_key: PublicKey,
}

impl PairingAnnouncement {
    /// `ip:port` text the phone app scans or types in
    pub fn pairing_address(&self) -> String {
        SocketAddr::new(self.local_ip, self.port).to_string()
    }
}

/// Shows the pairing announcement to the operator
pub trait Announcer: Send + Sync {
    fn announce(&self, announcement: &PairingAnnouncement);
}

/// Announces through the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&self, announcement: &PairingAnnouncement) {
        info!(
            address = %announcement.pairing_address(),
            public_key = %announcement.desktop_public_key,
            fingerprint = %announcement.desktop_public_key.fingerprint(),
            "Pairing listener ready"
        );
    }
}

#[derive(Debug, Clone)]
pub struct PairingSettings {
    pub bind: SocketAddr,
    /// Port handed to approved phones
    pub notification_port: u16,
    /// Deadline for the handshake and for the request that follows it
    pub handshake_timeout: Duration,
    pub max_unit: usize,
}

impl PairingSettings {
    /// `notification_port` is where the notification listener actually
    /// ended up, which differs from the configuration for port 0.
    pub fn from_config(config: &PushlinkConfig, notification_port: u16) -> Self {
        Self {
            bind: SocketAddr::new(config.network.bind_address, config.network.pairing_port.unwrap_or(0)),
            notification_port,
            handshake_timeout: config.network.handshake_timeout(),
            max_unit: config.limits.max_unit_bytes,
        }
    }
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// Pairing listener before binding
pub struct PairingListener {
    settings: PairingSettings,
    store: IdentityStore,
    authorizer: Authorizer,
    desktop_public_key: PublicKey,
    prompt: Arc<dyn ApprovalPrompt>,
    announcer: Arc<dyn Announcer>,
    state: watch::Sender<PairingState>,
}

impl PairingListener {
    pub fn new(
        settings: PairingSettings,
        store: IdentityStore,
        authorizer: Authorizer,
        desktop_public_key: PublicKey,
        prompt: Arc<dyn ApprovalPrompt>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        let (state, _) = watch::channel(PairingState::Starting);
        Self {
            settings,
            store,
            authorizer,
            desktop_public_key,
            prompt,
            announcer,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<PairingState> {
        self.state.subscribe()
    }

    /// Bind and announce. On failure the listener is `Stopped`; the
    /// notification listener is unaffected.
    pub async fn bind(self) -> Result<BoundPairingListener, BindError> {
        let (listener, local_addr) = match net::bind_tcp(self.settings.bind).await {
            Ok(bound) => bound,
            Err(e) => {
                self.state.send_replace(PairingState::Stopped);
                error!(error = %e, "Pairing listener failed to start");
                return Err(e);
            }
        };

        let announcement = PairingAnnouncement {
            bind_address: local_addr.ip(),
            port: local_addr.port(),
            local_ip: net::advertised_ip(local_addr.ip()),
            desktop_public_key: self.desktop_public_key,
        };
        self.announcer.announce(&announcement);

        Ok(BoundPairingListener {
            listener,
            local_addr,
            announcement,
            inner: self,
        })
    }
}

/// Pairing listener holding its socket
pub struct BoundPairingListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    announcement: PairingAnnouncement,
    inner: PairingListener,
}

impl BoundPairingListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn announcement(&self) -> &PairingAnnouncement {
        &self.announcement
    }

    pub fn state(&self) -> watch::Receiver<PairingState> {
        self.inner.state()
    }

    /// Serve pairing requests one after another until shutdown
    pub async fn serve(self, shutdown: Shutdown) {
        self.set_state(PairingState::Listening(self.local_addr));

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.wait() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept pairing connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = self.handle_session(stream, peer_addr) => {}
            }
            self.set_state(PairingState::Listening(self.local_addr));
        }

        self.set_state(PairingState::Stopped);
        info!(address = %self.local_addr, "Pairing listener stopped");
    }

    fn set_state(&self, state: PairingState) {
        self.inner.state.send_replace(state);
    }

    async fn handle_session(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let settings = &self.inner.settings;
        let _ = stream.set_nodelay(true);

        let opened = tokio::time::timeout(settings.handshake_timeout, read_request(stream, settings.max_unit));
        let (mut channel, request) = match opened.await {
            Ok(Ok(Some(opened))) => opened,
            Ok(Ok(None)) => {
                debug!(address = %peer_addr, "Pairing connection closed before a request");
                return;
            }
            Ok(Err(e)) => {
                debug!(address = %peer_addr, error = %e, "Dropping pairing connection");
                return;
            }
            Err(_) => {
                debug!(address = %peer_addr, "Pairing request timed out");
                return;
            }
        };

        let identifier = request.identifier.clone();
        info!(
            peer = %identifier,
            address = %peer_addr,
            fingerprint = %request.public_key.fingerprint(),
            "Pairing request received"
        );
        self.set_state(PairingState::RequestReceived(identifier.clone()));

        self.set_state(PairingState::AwaitingApproval(identifier.clone()));
        let response = match self.inner.prompt.decide(&request, peer_addr).await {
            Approval::Approved => match self.trust(&request).await {
                Ok(_) => {
                    self.set_state(PairingState::Approved(identifier.clone()));
                    info!(peer = %identifier, "Pairing approved");
                    PairingResponse::Accepted {
                        notification_port: settings.notification_port,
                        desktop_public_key: self.inner.desktop_public_key,
                    }
                }
                Err(e) => {
                    self.set_state(PairingState::Rejected(identifier.clone()));
                    error!(peer = %identifier, error = %e, "Could not save trusted peer, rejecting pairing");
                    PairingResponse::Rejected
                }
            },
            Approval::Rejected => {
                self.set_state(PairingState::Rejected(identifier.clone()));
                info!(peer = %identifier, "Pairing rejected");
                PairingResponse::Rejected
            }
        };

        if let Err(e) = channel.send_parts(&response.to_parts()).await {
            warn!(peer = %identifier, error = %e, "Failed to send pairing response");
        }
    }

    /// Persist the peer and publish it to the notification listener
    async fn trust(&self, request: &PairingRequest) -> Result<TrustedPeer, StorageError> {
        let store = self.inner.store.clone();
        let authorizer = self.inner.authorizer.clone();
        let identifier = request.identifier.clone();
        let public_key = request.public_key;

        let path = self.inner.store.trust_dir();
        run_blocking("save", path, move || {
            let peer = store.add_trusted_peer(&identifier, &public_key)?;
            if let Err(e) = authorizer.refresh() {
                // The record is on disk; the listener's refresh on miss
                // will still find it.
                warn!(error = %e, "Failed to refresh trusted peers after pairing");
            }
            Ok(peer)
        })
        .await
    }
}

async fn read_request(
    stream: TcpStream,
    max_unit: usize,
) -> Result<Option<(SecureChannel<TcpStream>, PairingRequest)>, PairingSessionError> {
    let mut channel = channel::accept_pairing(stream, max_unit).await?;
    let Some(parts) = channel.recv_parts().await? else {
        return Ok(None);
    };
    let request = PairingRequest::from_parts(parts)?;
    Ok(Some((channel, request)))
}

/// Why a pairing connection was dropped without an answer
#[derive(Debug, thiserror::Error)]
enum PairingSessionError {
    #[error(transparent)]
    Channel(#[from] pushlink_core::ChannelError),

    #[error(transparent)]
    Request(#[from] pushlink_core::ProtocolFramingError),
}
