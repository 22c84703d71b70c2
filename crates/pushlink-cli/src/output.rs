//! Text shown on the terminal

use std::fmt::Write as _;
use std::path::Path;

use pushlink_core::{PublicKey, TrustedPeer};
use pushlink_runtime::{Announcer, PairingAnnouncement};

/// Prints the pairing address and desktop key for the operator to enter
/// on the phone
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalAnnouncer;

impl Announcer for TerminalAnnouncer {
    fn announce(&self, announcement: &PairingAnnouncement) {
        println!("{}", pairing_banner(announcement));
    }
}

pub fn pairing_banner(announcement: &PairingAnnouncement) -> String {
    let mut text = String::from("Waiting for a phone to pair\n");
    let _ = writeln!(text, "  Address:     {}", announcement.pairing_address());
    if announcement.bind_address.is_unspecified() {
        let _ = writeln!(text, "  Listening:   all interfaces, port {}", announcement.port);
    }
    let _ = writeln!(text, "  Desktop key: {}", announcement.desktop_public_key);
    let _ = write!(
        text,
        "  Fingerprint: {}",
        announcement.desktop_public_key.fingerprint()
    );
    text
}

/// Trusted phones, one per line
pub fn peer_table(peers: &[TrustedPeer]) -> String {
    if peers.is_empty() {
        return "No trusted phones".to_string();
    }

    let width = peers
        .iter()
        .map(|peer| peer.identifier.as_str().len())
        .max()
        .unwrap_or(0)
        .max("IDENTIFIER".len());

    let mut text = format!("{:<width$}  {:<23}  PUBLIC KEY\n", "IDENTIFIER", "FINGERPRINT");
    for peer in peers {
        let _ = writeln!(
            text,
            "{:<width$}  {:<23}  {}",
            peer.identifier.as_str(),
            peer.public_key.fingerprint().to_string(),
            peer.public_key
        );
    }
    text.truncate(text.trim_end().len());
    text
}

pub fn identity_summary(public_key: &PublicKey, base_dir: &Path) -> String {
    format!(
        "Public key:  {}\nFingerprint: {}\nStored in:   {}",
        public_key,
        public_key.fingerprint(),
        base_dir.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushlink_core::{KeyPair, PeerIdentifier};
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(identifier: &str) -> TrustedPeer {
        TrustedPeer {
            identifier: PeerIdentifier::new(identifier).unwrap(),
            public_key: *KeyPair::generate().public_key(),
        }
    }

    #[test]
    fn test_banner_shows_address_and_key() {
        let key = *KeyPair::generate().public_key();
        let announcement = PairingAnnouncement {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 41234,
            local_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)),
            desktop_public_key: key,
        };

        let banner = pairing_banner(&announcement);
        assert!(banner.contains("192.168.1.5:41234"));
        assert!(banner.contains("all interfaces"));
        assert!(banner.contains(&key.to_hex()));
        assert!(banner.contains(&key.fingerprint().to_string()));
    }

    #[test]
    fn test_peer_table_lists_every_peer() {
        let peers = vec![peer("192.168.1.20"), peer("a-rather-long-phone-name")];
        let table = peer_table(&peers);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("IDENTIFIER"));
        assert!(lines[1].starts_with("192.168.1.20 "));
        assert!(lines[2].ends_with(&peers[1].public_key.to_hex()));
    }

    #[test]
    fn test_empty_peer_table() {
        assert_eq!(peer_table(&[]), "No trusted phones");
    }
}
