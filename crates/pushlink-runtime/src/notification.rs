//! Encrypted notification listener
//!
//! Accepts TCP connections from paired phones, authenticates them with the
//! Noise `IK` handshake against the trusted peer set and forwards every
//! well-formed notification to the [`Dispatcher`].
//!
//! A phone whose static key is not trusted never gets a handshake reply:
//! the connection is dropped right after the first message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pushlink_core::channel::{self, SecureChannel};
use pushlink_core::config::PushlinkConfig;
use pushlink_core::{BindError, ChannelError, KeyPair, NotificationMessage, PeerIdentifier, StorageError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::authorizer::Authorizer;
use crate::dispatch::{Admission, Dispatcher};
use crate::net;
use crate::shutdown::Shutdown;

/// Pause after a failed `accept`, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// State & Settings
// ----------------------------------------------------------------------------

/// Lifecycle of a listener, published through a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Bound(SocketAddr),
    Serving(SocketAddr),
    Stopped,
}

impl ListenerState {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ListenerState::Bound(addr) | ListenerState::Serving(addr) => Some(*addr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub bind: SocketAddr,
    pub handshake_timeout: Duration,
    pub max_unit: usize,
}

impl NotificationSettings {
    pub fn from_config(config: &PushlinkConfig) -> Self {
        Self {
            bind: SocketAddr::new(config.network.bind_address, config.network.notification_port),
            handshake_timeout: config.network.handshake_timeout(),
            max_unit: config.limits.max_unit_bytes,
        }
    }
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// Notification listener before binding
pub struct NotificationListener {
    settings: NotificationSettings,
    context: Arc<ConnectionContext>,
    state: watch::Sender<ListenerState>,
}

struct ConnectionContext {
    keypair: Arc<KeyPair>,
    authorizer: Authorizer,
    dispatcher: Dispatcher,
    handshake_timeout: Duration,
    max_unit: usize,
}

impl NotificationListener {
    pub fn new(
        settings: NotificationSettings,
        keypair: Arc<KeyPair>,
        authorizer: Authorizer,
        dispatcher: Dispatcher,
    ) -> Self {
        let context = Arc::new(ConnectionContext {
            keypair,
            authorizer,
            dispatcher,
            handshake_timeout: settings.handshake_timeout,
            max_unit: settings.max_unit,
        });
        let (state, _) = watch::channel(ListenerState::Starting);

        Self {
            settings,
            context,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Re-read trusted peers from disk; safe while serving
    pub fn refresh_authorization(&self) -> Result<usize, StorageError> {
        self.context.authorizer.refresh()
    }

    /// Bind the configured address. On failure the listener is `Stopped`.
    pub async fn bind(self) -> Result<BoundNotificationListener, BindError> {
        match net::bind_tcp(self.settings.bind).await {
            Ok((listener, local_addr)) => {
                self.state.send_replace(ListenerState::Bound(local_addr));
                info!(address = %local_addr, "Notification listener bound");
                Ok(BoundNotificationListener {
                    listener,
                    local_addr,
                    context: self.context,
                    state: self.state,
                })
            }
            Err(e) => {
                self.state.send_replace(ListenerState::Stopped);
                error!(error = %e, "Notification listener failed to start");
                Err(e)
            }
        }
    }
}

/// Notification listener holding its socket
pub struct BoundNotificationListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<ConnectionContext>,
    state: watch::Sender<ListenerState>,
}

impl BoundNotificationListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Accept connections until shutdown. Each connection gets its own
    /// task; all of them are stopped before this returns.
    pub async fn serve(self, shutdown: Shutdown) {
        self.state.send_replace(ListenerState::Serving(self.local_addr));
        info!(address = %self.local_addr, "Listening for notifications");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let context = Arc::clone(&self.context);
                        let shutdown = shutdown.clone();
                        connections.spawn(handle_connection(context, stream, peer_addr, shutdown));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept notification connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(error = %e, "Notification connection task panicked");
                        }
                    }
                }
            }
        }

        connections.shutdown().await;
        self.state.send_replace(ListenerState::Stopped);
        info!(address = %self.local_addr, "Notification listener stopped");
    }
}

// ----------------------------------------------------------------------------
// Connection Handling
// ----------------------------------------------------------------------------

async fn handle_connection(
    context: Arc<ConnectionContext>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    shutdown: Shutdown,
) {
    let _ = stream.set_nodelay(true);

    let session = tokio::time::timeout(context.handshake_timeout, open_session(&context, stream, peer_addr));
    let (channel, peer) = match session.await {
        Ok(Ok(Some(session))) => session,
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            debug!(peer = %peer_addr, error = %e, "Notification handshake failed");
            return;
        }
        Err(_) => {
            let e = ChannelError::HandshakeTimeout {
                duration_ms: context.handshake_timeout.as_millis() as u64,
            };
            debug!(peer = %peer_addr, error = %e, "Notification handshake abandoned");
            return;
        }
    };

    info!(%peer, address = %peer_addr, "Trusted peer connected");
    tokio::select! {
        _ = shutdown.wait() => {}
        _ = receive_notifications(&context, channel, &peer) => {}
    }
    debug!(%peer, address = %peer_addr, "Notification connection closed");
}

/// Run the handshake up to the trust decision. `None` means the peer was
/// refused and the connection has been dropped.
async fn open_session(
    context: &ConnectionContext,
    stream: TcpStream,
    peer_addr: SocketAddr,
) -> Result<Option<(SecureChannel<TcpStream>, PeerIdentifier)>, ChannelError> {
    let pending = channel::accept_notification(stream, &context.keypair, context.max_unit).await?;

    let Some(peer) = context.authorizer.authorize(pending.remote_static()).await else {
        warn!(
            address = %peer_addr,
            fingerprint = %pending.remote_static().fingerprint(),
            "Refused connection from untrusted key"
        );
        return Ok(None);
    };

    let channel = pending.accept().await?;
    Ok(Some((channel, peer)))
}

async fn receive_notifications(context: &ConnectionContext, mut channel: SecureChannel<TcpStream>, peer: &PeerIdentifier) {
    let mut lane = context.dispatcher.lane(peer.clone());

    loop {
        match channel.recv_parts().await {
            Ok(Some(parts)) => match NotificationMessage::from_parts(parts) {
                Ok(message) => {
                    debug!(%peer, title = %message.title, "Notification accepted");
                    if lane.dispatch(message) == Admission::Dropped {
                        debug!(%peer, "Notification dropped under load");
                    }
                }
                Err(e) => debug!(%peer, error = %e, "Dropping malformed notification"),
            },
            Ok(None) => break,
            Err(e) if !e.is_fatal() => debug!(%peer, error = %e, "Dropping malformed unit"),
            Err(e) => {
                debug!(%peer, error = %e, "Closing notification connection");
                break;
            }
        }
    }
}
