use std::time::Duration;

use senz_core::message::{Message, MsgKind};
use senz_core::{crypto, wire};

use crate::*;

/// A senzie that disconnects reclaims its name on a new connection via
/// PING — no conflict, no reply, traffic flows to the new socket.
#[tokio::test]
async fn ping_reconnect_reclaims_name() {
    let switch = start_switch(600).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();
    alice.share().await.unwrap();
    let keypair = alice.keypair.clone();

    drop(alice);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!switch.ctx.registry.contains("alice"));

    let mut alice = TestClient::connect_as("alice", keypair, switch.addr)
        .await
        .unwrap();
    alice.ping().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(switch.ctx.registry.contains("alice"));

    let mut bob = TestClient::connect("bob", switch.addr).await.unwrap();
    bob.share().await.unwrap();
    let msg = Message::new(MsgKind::Data, "bob", "alice").with_attr("hello", "again");
    let line = bob.signed_line(&msg);
    bob.send_line(&line).await.unwrap();
    assert_eq!(alice.recv_line().await.unwrap(), line);
}

/// PING takeover while the previous holder is still connected: the entry
/// is replaced, and the superseded connection's eventual teardown must not
/// evict the new one.
#[tokio::test]
async fn ping_takeover_replaces_live_entry() {
    let switch = start_switch(600).await.unwrap();
    let mut first = TestClient::connect("alice", switch.addr).await.unwrap();
    first.share().await.unwrap();
    let keypair = first.keypair.clone();
    let first_conn = switch.ctx.registry.get("alice").unwrap().conn_id();

    let mut second = TestClient::connect_as("alice", keypair, switch.addr)
        .await
        .unwrap();
    second.ping().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second_conn = switch.ctx.registry.get("alice").unwrap().conn_id();
    assert_ne!(first_conn, second_conn);

    // Traffic goes to the takeover connection.
    let mut bob = TestClient::connect("bob", switch.addr).await.unwrap();
    bob.share().await.unwrap();
    let msg = Message::new(MsgKind::Data, "bob", "alice").with_attr("n", "1");
    let line = bob.signed_line(&msg);
    bob.send_line(&line).await.unwrap();
    assert_eq!(second.recv_line().await.unwrap(), line);
    first.expect_silence(Duration::from_millis(300)).await.unwrap();

    // The old connection going away leaves the new entry in place.
    drop(first);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        switch.ctx.registry.get("alice").unwrap().conn_id(),
        second_conn
    );
}

/// A PING on an already-authenticated connection never conflicts.
#[tokio::test]
async fn ping_on_live_connection_never_conflicts() {
    let switch = start_switch(600).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();
    alice.share().await.unwrap();

    alice.ping().await.unwrap();
    alice.ping().await.unwrap();

    // Still authenticated and routable.
    let get = Message::new(MsgKind::Get, "alice", SWITCH_NAME).with_attr("pubkey", "alice");
    alice.send_signed(&get).await.unwrap();
    assert!(alice.recv_line().await.is_ok());
    assert!(switch.ctx.registry.contains("alice"));
}

/// The switch emits a periodic keepalive PING on authenticated
/// connections: self-directed addressing, signed by the switch.
#[tokio::test]
async fn keepalive_ping_arrives_signed() {
    let switch = start_switch(1).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();
    alice.share().await.unwrap();

    let line = alice.recv_line().await.unwrap();
    let msg = wire::parse(&line).unwrap();
    assert_eq!(msg.kind, MsgKind::Ping);
    assert_eq!(msg.sender, "alice");
    assert_eq!(msg.receiver, SWITCH_NAME);
    crypto::verify_hex(
        wire::canonical_payload(&line).as_bytes(),
        msg.signature.as_deref().expect("keepalive must be signed"),
        &switch.ctx.keypair.public_hex(),
    )
    .unwrap();

    // It repeats.
    let again = wire::parse(&alice.recv_line().await.unwrap()).unwrap();
    assert_eq!(again.kind, MsgKind::Ping);
}

/// Unauthenticated connections get no keepalives.
#[tokio::test]
async fn no_keepalive_before_authentication() {
    let _switch = start_switch(1).await.unwrap();
    let mut idle = TestClient::connect("idle", _switch.addr).await.unwrap();
    idle.expect_silence(Duration::from_millis(1500)).await.unwrap();
}

/// Disconnect releases the registry entry.
#[tokio::test]
async fn disconnect_releases_registry_entry() {
    let switch = start_switch(600).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();
    alice.share().await.unwrap();
    assert!(switch.ctx.registry.contains("alice"));

    drop(alice);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!switch.ctx.registry.contains("alice"));
}
