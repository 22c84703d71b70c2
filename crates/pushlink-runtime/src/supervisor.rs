//! Relay lifecycle
//!
//! The [`Supervisor`] prepares the identity, binds the enabled listeners and
//! spawns them; the returned [`RunningRelay`] owns the shutdown trigger.
//! Each listener starts or fails on its own: a port conflict on the pairing
//! side leaves notifications running and vice versa.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pushlink_core::config::PushlinkConfig;
use pushlink_core::{BindError, IdentityStore, PublicKey, PushlinkError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::approval::{ApprovalPrompt, AutoReject};
use crate::authorizer::{run_blocking, Authorizer};
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::notification::{ListenerState, NotificationListener, NotificationSettings};
use crate::pairing::{Announcer, LogAnnouncer, PairingAnnouncement, PairingListener, PairingSettings, PairingState};
use crate::presentation::PresentationSink;
use crate::shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};

/// Upper bound on waiting for dispatch workers to observe shutdown
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which listeners to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Components {
    pub notifications: bool,
    pub pairing: bool,
}

impl Components {
    pub const ALL: Components = Components {
        notifications: true,
        pairing: true,
    };
    pub const NOTIFICATIONS_ONLY: Components = Components {
        notifications: true,
        pairing: false,
    };
    pub const PAIRING_ONLY: Components = Components {
        notifications: false,
        pairing: true,
    };
}

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

/// Builder for a running relay
pub struct Supervisor {
    config: PushlinkConfig,
    store: IdentityStore,
    sink: Arc<dyn PresentationSink>,
    prompt: Arc<dyn ApprovalPrompt>,
    announcer: Arc<dyn Announcer>,
    components: Components,
}

impl Supervisor {
    /// Both listeners, rejecting pairing requests until a prompt is set
    pub fn new(config: PushlinkConfig, store: IdentityStore, sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            config,
            store,
            sink,
            prompt: Arc::new(AutoReject),
            announcer: Arc::new(LogAnnouncer),
            components: Components::ALL,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ApprovalPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_announcer(mut self, announcer: Arc<dyn Announcer>) -> Self {
        self.announcer = announcer;
        self
    }

    pub fn with_components(mut self, components: Components) -> Self {
        self.components = components;
        self
    }

    /// Load the identity, bind and spawn the enabled listeners.
    ///
    /// Fails when the identity cannot be loaded or when no enabled listener
    /// could bind. A listener that fails while another one starts is
    /// reported through [`RunningRelay::bind_errors`].
    pub async fn start(self) -> Result<RunningRelay, PushlinkError> {
        self.config.validate()?;

        let store = self.store.clone();
        let (keypair, authorizer) = run_blocking("load", self.store.base_dir().to_path_buf(), move || {
            let keypair = store.ensure_identity()?;
            let authorizer = Authorizer::new(store)?;
            Ok((keypair, authorizer))
        })
        .await?;
        let keypair = Arc::new(keypair);
        let desktop_public_key = *keypair.public_key();
        info!(
            fingerprint = %desktop_public_key.fingerprint(),
            trusted_peers = authorizer.snapshot().len(),
            "Desktop identity loaded"
        );

        let (trigger, shutdown) = shutdown_channel();
        let dispatcher = Dispatcher::new(
            self.sink,
            DispatchSettings::from_config(&self.config.dispatch),
            shutdown.clone(),
        );
        let mut tasks = JoinSet::new();
        let mut bind_errors = Vec::new();

        let mut notification = None;
        if self.components.notifications {
            let listener = NotificationListener::new(
                NotificationSettings::from_config(&self.config),
                Arc::clone(&keypair),
                authorizer.clone(),
                dispatcher.clone(),
            );
            let state = listener.state();
            match listener.bind().await {
                Ok(bound) => {
                    notification = Some((bound.local_addr(), state));
                    tasks.spawn(bound.serve(shutdown.clone()));
                }
                Err(e) => bind_errors.push(e),
            }
        }

        // Approved phones must be sent where notifications really listen.
        let notification_port = notification
            .as_ref()
            .map(|(addr, _)| addr.port())
            .unwrap_or(self.config.network.notification_port);

        let mut pairing = None;
        if self.components.pairing {
            let listener = PairingListener::new(
                PairingSettings::from_config(&self.config, notification_port),
                self.store.clone(),
                authorizer.clone(),
                desktop_public_key,
                self.prompt,
                self.announcer,
            );
            let state = listener.state();
            match listener.bind().await {
                Ok(bound) => {
                    pairing = Some((bound.local_addr(), bound.announcement().clone(), state));
                    tasks.spawn(bound.serve(shutdown.clone()));
                }
                Err(e) => bind_errors.push(e),
            }
        }

        if tasks.is_empty() {
            return Err(match bind_errors.into_iter().next() {
                Some(e) => e.into(),
                None => PushlinkError::config_error("no listener enabled"),
            });
        }

        Ok(RunningRelay {
            trigger,
            shutdown,
            tasks,
            dispatcher,
            authorizer,
            desktop_public_key,
            notification,
            pairing,
            bind_errors,
        })
    }
}

// ----------------------------------------------------------------------------
// Running Relay
// ----------------------------------------------------------------------------

/// Handle to the spawned listeners
pub struct RunningRelay {
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
    tasks: JoinSet<()>,
    dispatcher: Dispatcher,
    authorizer: Authorizer,
    desktop_public_key: PublicKey,
    notification: Option<(SocketAddr, watch::Receiver<ListenerState>)>,
    pairing: Option<(SocketAddr, PairingAnnouncement, watch::Receiver<PairingState>)>,
    bind_errors: Vec<BindError>,
}

impl RunningRelay {
    pub fn desktop_public_key(&self) -> &PublicKey {
        &self.desktop_public_key
    }

    pub fn notification_addr(&self) -> Option<SocketAddr> {
        self.notification.as_ref().map(|(addr, _)| *addr)
    }

    pub fn notification_state(&self) -> Option<watch::Receiver<ListenerState>> {
        self.notification.as_ref().map(|(_, state)| state.clone())
    }

    pub fn pairing_addr(&self) -> Option<SocketAddr> {
        self.pairing.as_ref().map(|(addr, _, _)| *addr)
    }

    pub fn pairing_announcement(&self) -> Option<&PairingAnnouncement> {
        self.pairing.as_ref().map(|(_, announcement, _)| announcement)
    }

    pub fn pairing_state(&self) -> Option<watch::Receiver<PairingState>> {
        self.pairing.as_ref().map(|(_, _, state)| state.clone())
    }

    /// Listeners that were enabled but could not bind
    pub fn bind_errors(&self) -> &[BindError] {
        &self.bind_errors
    }

    /// Presentation toggle and load information
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Signal observed by everything this relay spawned
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop both listeners, close every connection and cancel in-flight
    /// presentations, waiting at most [`DRAIN_TIMEOUT`] for the workers.
    pub async fn shutdown(mut self) {
        info!("Shutting down");
        self.trigger.trigger();

        while let Some(finished) = self.tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Listener task failed");
            }
        }

        if !self.dispatcher.drain(DRAIN_TIMEOUT).await {
            warn!(
                in_flight = self.dispatcher.in_flight(),
                "Dispatch workers still running at shutdown"
            );
        }
        info!("Relay stopped");
    }
}
