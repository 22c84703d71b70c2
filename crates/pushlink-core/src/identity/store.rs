//! File-backed identity store
//!
//! The directory is the single source of truth: nothing is cached between
//! calls, so a peer added by one component is visible to the next
//! [`IdentityStore::load_trusted_peers`] from any other.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::record::KeyRecord;
use super::trust::{TrustStore, TrustedPeer};
use crate::crypto::KeyPair;
use crate::errors::StorageError;
use crate::types::{PeerIdentifier, PublicKey};

/// Directory name under the user's configuration directory
pub const APP_DIR_NAME: &str = "pushlink";

const SERVER_DIR: &str = "server";
const CLIENTS_DIR: &str = "clients";
const PUBLIC_KEY_FILE: &str = "server.key";
const SECRET_KEY_FILE: &str = "server.key_secret";
const TRUST_EXTENSION: &str = "key";

#[derive(Debug, Clone, Copy)]
enum FileMode {
    Public,
    Secret,
}

/// Owner of the desktop key pair and the trust directory
#[derive(Debug, Clone)]
pub struct IdentityStore {
    base_dir: PathBuf,
}

impl IdentityStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store under `$XDG_CONFIG_HOME/pushlink` (or the platform equivalent)
    pub fn open_default() -> Result<Self, StorageError> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(Self::new(config_dir.join(APP_DIR_NAME)))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding one record per trusted peer
    pub fn trust_dir(&self) -> PathBuf {
        self.base_dir.join(CLIENTS_DIR)
    }

    fn server_dir(&self) -> PathBuf {
        self.base_dir.join(SERVER_DIR)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.server_dir().join(PUBLIC_KEY_FILE)
    }

    pub fn secret_key_path(&self) -> PathBuf {
        self.server_dir().join(SECRET_KEY_FILE)
    }

    fn trust_path(&self, identifier: &PeerIdentifier) -> PathBuf {
        self.trust_dir()
            .join(format!("{}.{}", identifier, TRUST_EXTENSION))
    }

    fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [self.server_dir(), self.trust_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io("create", &dir, e))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Desktop Key Pair
    // ------------------------------------------------------------------------

    /// Load the desktop key pair, generating and saving one on first run.
    ///
    /// A public key file without its secret counterpart is an error rather
    /// than a reason to regenerate: peers already trust that key.
    pub fn ensure_identity(&self) -> Result<KeyPair, StorageError> {
        self.ensure_dirs()?;

        let secret_path = self.secret_key_path();
        match fs::read_to_string(&secret_path) {
            Ok(text) => return load_keypair(&secret_path, &text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io("read", &secret_path, e)),
        }

        let public_path = self.public_key_path();
        if public_path.exists() {
            return Err(StorageError::MissingSecret { path: secret_path });
        }

        let keypair = KeyPair::generate();
        let public_key = *keypair.public_key();

        write_atomic(
            &secret_path,
            &KeyRecord::with_secret(public_key, keypair.secret_bytes()).render(),
            FileMode::Secret,
        )?;
        write_atomic(&public_path, &KeyRecord::public(public_key).render(), FileMode::Public)?;

        info!(
            fingerprint = %public_key.fingerprint(),
            path = %secret_path.display(),
            "Generated desktop key pair"
        );
        Ok(keypair)
    }

    /// Public half of the desktop key pair, if one was generated
    pub fn desktop_public_key(&self) -> Result<Option<PublicKey>, StorageError> {
        let path = self.public_key_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io("read", &path, e)),
        };

        let record = KeyRecord::parse(&text).map_err(|reason| StorageError::invalid_record(&path, reason))?;
        Ok(Some(record.public_key))
    }

    // ------------------------------------------------------------------------
    // Trusted Peers
    // ------------------------------------------------------------------------

    /// Scan the trust directory. Entries that cannot be read or parsed are
    /// skipped with a warning.
    pub fn load_trusted_peers(&self) -> Result<TrustStore, StorageError> {
        let dir = self.trust_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TrustStore::new()),
            Err(e) => return Err(StorageError::io("list", &dir, e)),
        };

        let mut store = TrustStore::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable trust entry");
                    continue;
                }
            };

            match read_trusted_peer(&path) {
                Ok(Some(peer)) => {
                    store.insert(peer);
                }
                Ok(None) => debug!(path = %path.display(), "Ignoring non-key file in trust directory"),
                Err(e) => warn!(error = %e, "Skipping trust record"),
            }
        }

        debug!(peers = store.len(), "Loaded trusted peers");
        Ok(store)
    }

    /// Trusted peers sorted by identifier
    pub fn list_trusted_peers(&self) -> Result<Vec<TrustedPeer>, StorageError> {
        Ok(self.load_trusted_peers()?.peers().collect())
    }

    /// Key currently on disk for `identifier`. A missing or unparsable
    /// record means the peer is not trusted.
    pub fn trusted_key(&self, identifier: &PeerIdentifier) -> Result<Option<PublicKey>, StorageError> {
        let path = self.trust_path(identifier);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io("read", &path, e)),
        };

        match KeyRecord::parse(&text) {
            Ok(record) => Ok(Some(record.public_key)),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Ignoring invalid trust record");
                Ok(None)
            }
        }
    }

    /// Persist trust for a peer, replacing any earlier key for the same
    /// identifier. The record is complete on disk when this returns.
    pub fn add_trusted_peer(
        &self,
        identifier: &PeerIdentifier,
        public_key: &PublicKey,
    ) -> Result<TrustedPeer, StorageError> {
        let dir = self.trust_dir();
        fs::create_dir_all(&dir).map_err(|e| StorageError::io("create", &dir, e))?;

        let path = self.trust_path(identifier);
        write_atomic(&path, &KeyRecord::public(*public_key).render(), FileMode::Public)?;

        info!(
            peer = %identifier,
            fingerprint = %public_key.fingerprint(),
            "Trusted peer saved"
        );
        Ok(TrustedPeer {
            identifier: identifier.clone(),
            public_key: *public_key,
        })
    }
}

fn load_keypair(path: &Path, text: &str) -> Result<KeyPair, StorageError> {
    let record = KeyRecord::parse(text).map_err(|reason| StorageError::invalid_record(path, reason))?;
    let secret = record.secret_key.ok_or_else(|| StorageError::MissingSecret {
        path: path.to_path_buf(),
    })?;

    let keypair = KeyPair::from_secret_bytes(secret);
    if keypair.public_key() != &record.public_key {
        return Err(StorageError::invalid_record(
            path,
            "public-key does not match secret-key",
        ));
    }
    Ok(keypair)
}

/// `Ok(None)` for files that are not trust records at all
fn read_trusted_peer(path: &Path) -> Result<Option<TrustedPeer>, StorageError> {
    if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(TRUST_EXTENSION) {
        return Ok(None);
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StorageError::invalid_record(path, "file name is not UTF-8"))?;
    let identifier =
        PeerIdentifier::new(stem).map_err(|e| StorageError::invalid_record(path, e.to_string()))?;

    let text = fs::read_to_string(path).map_err(|e| StorageError::io("read", path, e))?;
    let record = KeyRecord::parse(&text).map_err(|reason| StorageError::invalid_record(path, reason))?;

    Ok(Some(TrustedPeer {
        identifier,
        public_key: record.public_key,
    }))
}

/// Write through a temporary file in the same directory, then rename, so a
/// reader never observes a partial record.
fn write_atomic(path: &Path, contents: &str, mode: FileMode) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut file =
        NamedTempFile::new_in(dir).map_err(|e| StorageError::io("create temporary file in", dir, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| StorageError::io("write", file.path().to_path_buf(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let bits = match mode {
            FileMode::Public => 0o644,
            FileMode::Secret => 0o600,
        };
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(bits))
            .map_err(|e| StorageError::io("set permissions on", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.as_file()
        .sync_all()
        .map_err(|e| StorageError::io("sync", path, e))?;
    file.persist(path)
        .map_err(|e| StorageError::io("replace", path, e.error))?;

    #[cfg(unix)]
    if let Ok(dir) = fs::File::open(dir) {
        // Makes the rename itself durable.
        let _ = dir.sync_all();
    }

    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, IdentityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("pushlink"));
        (dir, store)
    }

    fn id(s: &str) -> PeerIdentifier {
        PeerIdentifier::new(s).unwrap()
    }

    #[test]
    fn test_ensure_identity_is_idempotent() {
        let (_dir, store) = store();

        let first = store.ensure_identity().unwrap();
        let second = store.ensure_identity().unwrap();

        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.secret_bytes(), second.secret_bytes());
        assert_eq!(store.desktop_public_key().unwrap(), Some(*first.public_key()));
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        store.ensure_identity().unwrap();

        let mode = fs::metadata(store.secret_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_secret_is_not_regenerated() {
        let (_dir, store) = store();
        store.ensure_identity().unwrap();
        fs::remove_file(store.secret_key_path()).unwrap();

        let err = store.ensure_identity().unwrap_err();
        assert!(matches!(err, StorageError::MissingSecret { .. }));
    }

    #[test]
    fn test_tampered_public_key_is_detected() {
        let (_dir, store) = store();
        let keypair = store.ensure_identity().unwrap();

        let forged = KeyRecord::with_secret(PublicKey::new([0; 32]), keypair.secret_bytes());
        fs::write(store.secret_key_path(), forged.render()).unwrap();

        assert!(matches!(
            store.ensure_identity(),
            Err(StorageError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_ensure_identity_reports_unwritable_base() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let store = IdentityStore::new(blocker.join("pushlink"));
        assert!(matches!(store.ensure_identity(), Err(StorageError::Io { .. })));
    }

    #[test]
    fn test_added_peer_is_visible_immediately() {
        let (_dir, store) = store();
        assert!(store.load_trusted_peers().unwrap().is_empty());

        let key = PublicKey::new([7; 32]);
        store.add_trusted_peer(&id("192.168.1.50"), &key).unwrap();

        let trust = store.load_trusted_peers().unwrap();
        assert_eq!(trust.get(&id("192.168.1.50")), Some(&key));
        assert!(store.trust_dir().join("192.168.1.50.key").is_file());
    }

    #[test]
    fn test_repairing_replaces_key() {
        let (_dir, store) = store();
        let old = PublicKey::new([1; 32]);
        let new = PublicKey::new([2; 32]);

        store.add_trusted_peer(&id("phone"), &old).unwrap();
        store.add_trusted_peer(&id("phone"), &new).unwrap();

        let trust = store.load_trusted_peers().unwrap();
        assert_eq!(trust.len(), 1);
        assert!(trust.is_trusted(&new));
        assert!(!trust.is_trusted(&old));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let (_dir, store) = store();
        store.add_trusted_peer(&id("good"), &PublicKey::new([4; 32])).unwrap();

        let trust_dir = store.trust_dir();
        fs::write(trust_dir.join("broken.key"), "metadata\ncurve\n").unwrap();
        fs::write(trust_dir.join("README.txt"), "not a key").unwrap();
        fs::create_dir(trust_dir.join("nested.key")).unwrap();

        let peers = store.list_trusted_peers().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].identifier.as_str(), "good");
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let (_dir, store) = store();
        store.add_trusted_peer(&id("phone"), &PublicKey::new([4; 32])).unwrap();

        let names: Vec<_> = fs::read_dir(store.trust_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["phone.key".to_string()]);
    }
}
