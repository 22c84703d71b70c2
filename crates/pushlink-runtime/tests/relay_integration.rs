//! End-to-end tests of a running relay over loopback TCP
//!
//! Each test starts a real relay with ephemeral ports and a scratch identity
//! store, then plays the phone with `PeerClient`.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use common::*;
use pushlink_core::{
    NotificationMessage, PairingResponse, PeerIdentifier, PresentationError, PushlinkError,
};
use pushlink_runtime::{
    AutoApprove, AutoReject, Components, ListenerState, PeerClient, Presentation, PresentationSink,
    RunningRelay, Supervisor,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

async fn start_relay(
    dir: &tempfile::TempDir,
    components: Components,
) -> (RunningRelay, mpsc::UnboundedReceiver<Received>) {
    let config = test_config(dir.path());
    let (sink, received) = ChannelSink::new();
    let relay = Supervisor::new(config.clone(), store_for(&config), sink)
        .with_components(components)
        .with_prompt(Arc::new(AutoApprove))
        .start()
        .await
        .unwrap();
    (relay, received)
}

/// A sink whose presentation never completes
struct StuckSink;

#[async_trait]
impl PresentationSink for StuckSink {
    async fn present(&self, _presentation: &Presentation) -> Result<(), PresentationError> {
        std::future::pending().await
    }
}

fn id(s: &str) -> PeerIdentifier {
    PeerIdentifier::new(s).unwrap()
}

/// Trust a fresh phone by writing its record directly
fn trusted_client(dir: &tempfile::TempDir, identifier: &str) -> PeerClient {
    let client = PeerClient::generate();
    let config = test_config(dir.path());
    store_for(&config)
        .add_trusted_peer(&id(identifier), client.public_key())
        .unwrap();
    client
}

// ----------------------------------------------------------------------------
// Notification Listener
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_untrusted_peer_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (relay, mut received) = start_relay(&dir, Components::NOTIFICATIONS_ONLY).await;

    let stranger = PeerClient::generate();
    let result = stranger
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await;

    assert!(result.is_err());
    assert!(nothing_received(&mut received).await);
    relay.shutdown().await;
}

#[tokio::test]
async fn test_trusted_peer_notifications_are_presented_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let phone = trusted_client(&dir, "192.168.1.20");
    let (relay, mut received) = start_relay(&dir, Components::NOTIFICATIONS_ONLY).await;

    let mut sender = phone
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await
        .unwrap();
    sender.send(NotificationMessage::new("Hello", "World")).await.unwrap();
    sender
        .send(NotificationMessage::new("Photo", "Look").with_image(PNG.to_vec()))
        .await
        .unwrap();

    let first = next_received(&mut received).await;
    assert_eq!(first.peer, "192.168.1.20");
    assert_eq!((first.title.as_str(), first.body.as_str()), ("Hello", "World"));
    assert!(first.image.is_none());

    let second = next_received(&mut received).await;
    assert_eq!(second.title, "Photo");
    let (path, bytes) = second.image.unwrap();
    assert_eq!(path.extension().unwrap(), "png");
    assert_eq!(bytes, PNG);

    sender.close().await.unwrap();
    relay.shutdown().await;
}

#[tokio::test]
async fn test_malformed_units_are_dropped_and_session_continues() {
    let dir = tempfile::tempdir().unwrap();
    let phone = trusted_client(&dir, "phone");
    let (relay, mut received) = start_relay(&dir, Components::NOTIFICATIONS_ONLY).await;

    let mut sender = phone
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await
        .unwrap();

    let four: [&[u8]; 4] = [b"app", b"title", b"body", b"extra"];
    sender.send_parts(&four).await.unwrap();
    sender.send_parts(&[b"lonely".as_slice()]).await.unwrap();
    sender.send_parts(&[[0xffu8, 0xfe].as_slice(), b"body".as_slice()]).await.unwrap();
    sender.send(NotificationMessage::new("Valid", "Still here")).await.unwrap();

    let only = next_received(&mut received).await;
    assert_eq!(only.title, "Valid");
    assert!(nothing_received(&mut received).await);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_disabled_presentation_suppresses_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let phone = trusted_client(&dir, "phone");
    let (relay, mut received) = start_relay(&dir, Components::NOTIFICATIONS_ONLY).await;

    assert!(!relay.dispatcher().toggle());

    let mut sender = phone
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await
        .unwrap();
    sender.send(NotificationMessage::new("Muted", "")).await.unwrap();
    assert!(nothing_received(&mut received).await);

    assert!(relay.dispatcher().toggle());
    sender.send(NotificationMessage::new("Loud", "")).await.unwrap();
    assert_eq!(next_received(&mut received).await.title, "Loud");

    relay.shutdown().await;
}

// ----------------------------------------------------------------------------
// Pairing
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_pairing_then_immediate_notification() {
    let dir = tempfile::tempdir().unwrap();
    let (relay, mut received) = start_relay(&dir, Components::ALL).await;

    let phone = PeerClient::generate();
    let response = phone
        .pair(relay.pairing_addr().unwrap(), &id("10.1.1.7"))
        .await
        .unwrap();

    let PairingResponse::Accepted {
        notification_port,
        desktop_public_key,
    } = response
    else {
        panic!("pairing should be accepted");
    };
    assert_eq!(notification_port, relay.notification_addr().unwrap().port());
    assert_eq!(&desktop_public_key, relay.desktop_public_key());

    // No restart and no waiting: the trust update precedes the reply.
    let mut sender = phone
        .connect(loopback(notification_port), &desktop_public_key)
        .await
        .unwrap();
    sender.send(NotificationMessage::new("First", "After pairing")).await.unwrap();
    assert_eq!(next_received(&mut received).await.peer, "10.1.1.7");

    relay.shutdown().await;
}

#[tokio::test]
async fn test_deleting_trust_record_revokes_phone() {
    let dir = tempfile::tempdir().unwrap();
    let (relay, mut received) = start_relay(&dir, Components::ALL).await;
    let notifications = relay.notification_addr().unwrap();

    let phone = PeerClient::generate();
    phone.pair(relay.pairing_addr().unwrap(), &id("phone")).await.unwrap();
    let mut sender = phone
        .connect(notifications, relay.desktop_public_key())
        .await
        .unwrap();
    sender.send(NotificationMessage::new("Before", "")).await.unwrap();
    assert_eq!(next_received(&mut received).await.title, "Before");
    sender.close().await.unwrap();

    let store = store_for(&test_config(dir.path()));
    std::fs::remove_file(store.trust_dir().join("phone.key")).unwrap();

    assert!(phone
        .connect(notifications, relay.desktop_public_key())
        .await
        .is_err());
    assert!(!relay.authorizer().snapshot().is_trusted(phone.public_key()));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_rejected_pairing_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (sink, _received) = ChannelSink::new();
    let relay = Supervisor::new(config.clone(), store_for(&config), sink)
        .with_prompt(Arc::new(AutoReject))
        .start()
        .await
        .unwrap();

    let phone = PeerClient::generate();
    let response = phone.pair(relay.pairing_addr().unwrap(), &id("phone")).await.unwrap();
    assert_eq!(response, PairingResponse::Rejected);

    assert!(store_for(&config).list_trusted_peers().unwrap().is_empty());
    assert!(phone
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await
        .is_err());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_repairing_replaces_the_old_key() {
    let dir = tempfile::tempdir().unwrap();
    let (relay, mut received) = start_relay(&dir, Components::ALL).await;
    let pairing = relay.pairing_addr().unwrap();
    let notifications = relay.notification_addr().unwrap();

    let old_phone = PeerClient::generate();
    let new_phone = PeerClient::generate();
    old_phone.pair(pairing, &id("phone")).await.unwrap();
    new_phone.pair(pairing, &id("phone")).await.unwrap();

    let peers = store_for(&test_config(dir.path())).list_trusted_peers().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(&peers[0].public_key, new_phone.public_key());

    assert!(old_phone
        .connect(notifications, relay.desktop_public_key())
        .await
        .is_err());

    let mut sender = new_phone
        .connect(notifications, relay.desktop_public_key())
        .await
        .unwrap();
    sender.send(NotificationMessage::new("New key", "")).await.unwrap();
    assert_eq!(next_received(&mut received).await.title, "New key");

    relay.shutdown().await;
}

#[tokio::test]
async fn test_invalid_pairing_request_gets_no_reply() {
    let dir = tempfile::tempdir().unwrap();
    let (relay, _received) = start_relay(&dir, Components::PAIRING_ONLY).await;

    let stream = tokio::net::TcpStream::connect(relay.pairing_addr().unwrap())
        .await
        .unwrap();
    let mut channel = pushlink_core::channel::connect_pairing(stream, 1 << 20).await.unwrap();
    channel
        .send_parts(&[b"phone".as_slice(), b"not-a-key".as_slice()])
        .await
        .unwrap();

    let reply = timeout(WAIT, channel.recv_parts()).await.unwrap();
    assert!(!matches!(reply, Ok(Some(_))));
    assert!(store_for(&test_config(dir.path()))
        .list_trusted_peers()
        .unwrap()
        .is_empty());

    relay.shutdown().await;
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_pairing_port_in_use_leaves_notifications_serving() {
    let dir = tempfile::tempdir().unwrap();
    let phone = trusted_client(&dir, "phone");
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut config = test_config(dir.path());
    config.network.pairing_port = Some(occupied.local_addr().unwrap().port());
    let (sink, mut received) = ChannelSink::new();
    let relay = Supervisor::new(config.clone(), store_for(&config), sink)
        .start()
        .await
        .unwrap();

    assert_eq!(relay.bind_errors().len(), 1);
    assert!(relay.bind_errors()[0].is_port_in_use());
    assert!(relay.pairing_addr().is_none());

    let mut state = relay.notification_state().unwrap();
    timeout(WAIT, state.wait_for(|s| matches!(s, ListenerState::Serving(_))))
        .await
        .unwrap()
        .unwrap();

    let mut sender = phone
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await
        .unwrap();
    sender.send(NotificationMessage::new("Unaffected", "")).await.unwrap();
    assert_eq!(next_received(&mut received).await.title, "Unaffected");

    relay.shutdown().await;
}

#[tokio::test]
async fn test_start_fails_when_no_listener_binds() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut config = test_config(dir.path());
    config.network.notification_port = occupied.local_addr().unwrap().port();
    let (sink, _received) = ChannelSink::new();
    let result = Supervisor::new(config.clone(), store_for(&config), sink)
        .with_components(Components::NOTIFICATIONS_ONLY)
        .start()
        .await;

    match result {
        Err(PushlinkError::Bind(e)) => assert!(e.is_port_in_use()),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("relay started without a socket"),
    }
}

#[tokio::test]
async fn test_shutdown_stops_listeners() {
    let dir = tempfile::tempdir().unwrap();
    let (relay, _received) = start_relay(&dir, Components::ALL).await;

    let address = relay.notification_addr().unwrap();
    let mut notification_state = relay.notification_state().unwrap();
    let mut pairing_state = relay.pairing_state().unwrap();
    relay.shutdown().await;

    assert_eq!(*notification_state.borrow_and_update(), ListenerState::Stopped);
    assert_eq!(
        *pairing_state.borrow_and_update(),
        pushlink_runtime::PairingState::Stopped
    );
    assert!(tokio::net::TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn test_shutdown_cancels_stuck_presentation() {
    let dir = tempfile::tempdir().unwrap();
    let phone = trusted_client(&dir, "phone");
    let config = test_config(dir.path());
    let relay = Supervisor::new(config.clone(), store_for(&config), Arc::new(StuckSink))
        .with_components(Components::NOTIFICATIONS_ONLY)
        .start()
        .await
        .unwrap();
    let dispatcher = relay.dispatcher().clone();

    let mut sender = phone
        .connect(relay.notification_addr().unwrap(), relay.desktop_public_key())
        .await
        .unwrap();
    sender.send(NotificationMessage::new("Never shown", "")).await.unwrap();
    timeout(WAIT, async {
        while dispatcher.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let started = Instant::now();
    relay.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn test_identity_is_stable_across_restarts() {
    let dir = tempfile::tempdir().unwrap();

    let (first, _received) = start_relay(&dir, Components::NOTIFICATIONS_ONLY).await;
    let key = *first.desktop_public_key();
    first.shutdown().await;

    let (second, _received) = start_relay(&dir, Components::NOTIFICATIONS_ONLY).await;
    assert_eq!(second.desktop_public_key(), &key);
    second.shutdown().await;
}
