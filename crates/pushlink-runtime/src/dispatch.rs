//! Notification dispatch
//!
//! Every accepted notification runs on its own short-lived task so a slow
//! sink never stalls a connection's read loop. A semaphore bounds how many
//! of those tasks exist at once; past the bound messages are dropped. Tasks
//! from the same connection are chained through a [`DispatchLane`] so they
//! reach the sink in arrival order. Workers watch the relay's [`Shutdown`]
//! and abandon the sink call when it fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pushlink_core::config::DispatchConfig;
use pushlink_core::{NotificationMessage, PeerIdentifier, PresentationError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::presentation::{Presentation, PresentationSink, RenderedImage, Template};
use crate::shutdown::Shutdown;

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub title: Template,
    pub body: Template,
    pub max_in_flight: usize,
    pub enabled: bool,
}

impl DispatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            title: Template::new(config.title_format.clone()),
            body: Template::new(config.body_format.clone()),
            max_in_flight: config.max_in_flight,
            enabled: config.enabled,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// What happened to a message handed to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A worker will present it
    Queued,
    /// Presentation is switched off; only logged
    Suppressed,
    /// Too many workers in flight
    Dropped,
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Cloneable handle to the shared dispatch state
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    sink: Arc<dyn PresentationSink>,
    title: Template,
    body: Template,
    permits: Arc<Semaphore>,
    capacity: usize,
    enabled: AtomicBool,
    shutdown: Shutdown,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn PresentationSink>, settings: DispatchSettings, shutdown: Shutdown) -> Self {
        let capacity = settings.max_in_flight.max(1);
        Self {
            inner: Arc::new(DispatcherInner {
                sink,
                title: settings.title,
                body: settings.body,
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                enabled: AtomicBool::new(settings.enabled),
                shutdown,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip presentation on or off, returning the new state
    pub fn toggle(&self) -> bool {
        let enabled = !self.inner.enabled.fetch_xor(true, Ordering::SeqCst);
        info!(enabled, "Notification presentation toggled");
        enabled
    }

    /// Workers currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.inner.capacity - self.inner.permits.available_permits()
    }

    /// Ordered dispatch for one connection
    pub fn lane(&self, peer: PeerIdentifier) -> DispatchLane {
        DispatchLane {
            dispatcher: self.clone(),
            peer,
            tail: None,
        }
    }

    /// Dispatch a single message with no ordering constraint
    pub fn dispatch(&self, peer: PeerIdentifier, message: NotificationMessage) -> Admission {
        self.lane(peer).dispatch(message)
    }

    /// Wait until every worker has finished, up to `timeout`. Returns
    /// whether the dispatcher went idle in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let all = self.inner.capacity as u32;
        matches!(
            tokio::time::timeout(timeout, self.inner.permits.acquire_many(all)).await,
            Ok(Ok(_))
        )
    }
}

impl DispatcherInner {
    async fn present(&self, peer: PeerIdentifier, message: NotificationMessage) -> Result<(), PresentationError> {
        let result = self.try_present(peer.clone(), message).await;
        match &result {
            Ok(()) => debug!(%peer, "Notification presented"),
            Err(e) => warn!(%peer, error = %e, "Failed to present notification"),
        }
        result
    }

    async fn try_present(&self, peer: PeerIdentifier, message: NotificationMessage) -> Result<(), PresentationError> {
        let image = match message.image.as_deref() {
            Some(bytes) if !bytes.is_empty() => Some(RenderedImage::from_bytes(bytes)?),
            _ => None,
        };

        let presentation = Presentation {
            title: self.title.render(&message.title, &message.body),
            body: self.body.render(&message.title, &message.body),
            image,
            peer,
        };
        self.sink.present(&presentation).await
    }
}

// ----------------------------------------------------------------------------
// Dispatch Lane
// ----------------------------------------------------------------------------

/// Per-connection dispatch preserving arrival order
pub struct DispatchLane {
    dispatcher: Dispatcher,
    peer: PeerIdentifier,
    tail: Option<JoinHandle<Result<(), PresentationError>>>,
}

impl DispatchLane {
    /// Hand a message to a worker without waiting for it
    pub fn dispatch(&mut self, message: NotificationMessage) -> Admission {
        let inner = &self.dispatcher.inner;

        if !inner.enabled.load(Ordering::SeqCst) {
            info!(
                peer = %self.peer,
                title = %message.title,
                body = %message.body,
                "Notification received while presentation is disabled"
            );
            return Admission::Suppressed;
        }

        let Ok(permit) = Arc::clone(&inner.permits).try_acquire_owned() else {
            warn!(
                peer = %self.peer,
                limit = inner.capacity,
                "Too many notifications in flight, dropping one"
            );
            return Admission::Dropped;
        };

        let previous = self.tail.take();
        let inner = Arc::clone(inner);
        let peer = self.peer.clone();

        let shutdown = inner.shutdown.clone();

        self.tail = Some(tokio::spawn(async move {
            let _permit = permit;
            let work = async {
                if let Some(previous) = previous {
                    // Failures were already logged by that worker.
                    let _ = previous.await;
                }
                inner.present(peer.clone(), message).await
            };
            tokio::select! {
                _ = shutdown.wait() => {
                    debug!(%peer, "Presentation abandoned at shutdown");
                    Ok(())
                }
                result = work => result,
            }
        }));
        Admission::Queued
    }

    /// Wait for every message dispatched on this lane
    pub async fn finish(mut self) {
        if let Some(tail) = self.tail.take() {
            let _ = tail.await;
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
