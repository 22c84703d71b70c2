//! Live view of the trust directory for the notification listener
//!
//! The [`Authorizer`] publishes an immutable [`TrustStore`] snapshot through a
//! watch channel. Refreshing builds a complete new snapshot from disk and
//! swaps it in, so readers never see a half-loaded set. Every trust decision
//! is confirmed against the record on disk, so deleting a record revokes the
//! peer for its next connection.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pushlink_core::{IdentityStore, PeerIdentifier, PublicKey, StorageError, TrustStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Minimum spacing between refreshes caused by unknown keys
pub const MISS_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// Cloneable handle deciding which peer keys may deliver notifications
#[derive(Debug, Clone)]
pub struct Authorizer {
    inner: Arc<AuthorizerInner>,
}

#[derive(Debug)]
struct AuthorizerInner {
    store: IdentityStore,
    snapshot: watch::Sender<Arc<TrustStore>>,
    last_miss_refresh: Mutex<Option<Instant>>,
}

impl Authorizer {
    /// Load the current trust directory and start publishing it
    pub fn new(store: IdentityStore) -> Result<Self, StorageError> {
        let trust = store.load_trusted_peers()?;
        let (snapshot, _) = watch::channel(Arc::new(trust));

        Ok(Self {
            inner: Arc::new(AuthorizerInner {
                store,
                snapshot,
                last_miss_refresh: Mutex::new(None),
            }),
        })
    }

    /// Re-read the trust directory and publish the result. Returns the
    /// number of trusted peers.
    pub fn refresh(&self) -> Result<usize, StorageError> {
        let trust = self.inner.store.load_trusted_peers()?;
        let count = trust.len();
        self.inner.snapshot.send_replace(Arc::new(trust));
        debug!(peers = count, "Trust snapshot refreshed");
        Ok(count)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<TrustStore> {
        self.inner.snapshot.borrow().clone()
    }

    /// Follow snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<Arc<TrustStore>> {
        self.inner.snapshot.subscribe()
    }

    /// Identifier trusted with `key`, if any. Disk access runs on the
    /// blocking pool.
    pub async fn authorize(&self, key: &PublicKey) -> Option<PeerIdentifier> {
        let authorizer = self.clone();
        let key = *key;
        match tokio::task::spawn_blocking(move || authorizer.authorize_blocking(&key)).await {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!(error = %e, "Trust check did not complete");
                None
            }
        }
    }

    /// Synchronous form of [`authorize`](Self::authorize).
    ///
    /// A snapshot hit is confirmed against the peer's record on disk; a
    /// record that is gone or holds another key forces a full refresh. A
    /// miss triggers one refresh, rate limited by [`MISS_REFRESH_INTERVAL`],
    /// so records added outside this process are picked up without a
    /// restart.
    pub fn authorize_blocking(&self, key: &PublicKey) -> Option<PeerIdentifier> {
        if let Some(identifier) = self.snapshot().identifier_for(key).cloned() {
            match self.inner.store.trusted_key(&identifier) {
                Ok(Some(current)) if current == *key => return Some(identifier),
                Ok(_) => info!(peer = %identifier, "Trust record removed or replaced on disk"),
                Err(e) => {
                    warn!(peer = %identifier, error = %e, "Could not confirm trust record");
                    return None;
                }
            }
            return self.refresh_and_lookup(key);
        }

        if !self.claim_miss_refresh() {
            return None;
        }
        self.refresh_and_lookup(key)
    }

    fn refresh_and_lookup(&self, key: &PublicKey) -> Option<PeerIdentifier> {
        if let Err(e) = self.refresh() {
            warn!(error = %e, "Failed to refresh trusted peers");
            return None;
        }
        self.snapshot().identifier_for(key).cloned()
    }

    fn claim_miss_refresh(&self) -> bool {
        let Ok(mut last) = self.inner.last_miss_refresh.lock() else {
            return false;
        };

        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < MISS_REFRESH_INTERVAL => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Run identity store work on the blocking pool. A worker that panics or is
/// cancelled is reported as an io failure on `path`.
pub(crate) async fn run_blocking<T, F>(action: &'static str, path: PathBuf, work: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(StorageError::Io {
            action,
            path,
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        }),
    }
}
