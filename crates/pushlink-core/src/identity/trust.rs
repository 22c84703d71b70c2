//! In-memory view of the trust directory

use std::collections::BTreeMap;

use crate::types::{PeerIdentifier, PublicKey};

/// A phone the operator approved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedPeer {
    pub identifier: PeerIdentifier,
    pub public_key: PublicKey,
}

/// Snapshot of every trusted peer, keyed by identifier.
///
/// Rebuilt from disk by [`IdentityStore::load_trusted_peers`](super::IdentityStore::load_trusted_peers);
/// never written back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    peers: BTreeMap<PeerIdentifier, PublicKey>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the key for an identifier
    pub fn insert(&mut self, peer: TrustedPeer) -> Option<PublicKey> {
        self.peers.insert(peer.identifier, peer.public_key)
    }

    pub fn get(&self, identifier: &PeerIdentifier) -> Option<&PublicKey> {
        self.peers.get(identifier)
    }

    /// Identifier trusted with this key, if any
    pub fn identifier_for(&self, key: &PublicKey) -> Option<&PeerIdentifier> {
        self.peers
            .iter()
            .find_map(|(identifier, trusted)| (trusted == key).then_some(identifier))
    }

    pub fn is_trusted(&self, key: &PublicKey) -> bool {
        self.identifier_for(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers in identifier order
    pub fn peers(&self) -> impl Iterator<Item = TrustedPeer> + '_ {
        self.peers.iter().map(|(identifier, public_key)| TrustedPeer {
            identifier: identifier.clone(),
            public_key: *public_key,
        })
    }
}

impl FromIterator<TrustedPeer> for TrustStore {
    fn from_iter<I: IntoIterator<Item = TrustedPeer>>(iter: I) -> Self {
        let mut store = TrustStore::new();
        for peer in iter {
            store.insert(peer);
        }
        store
    }
}
