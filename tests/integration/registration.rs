use std::time::Duration;

use senz_core::message::{Message, MsgKind};
use senz_core::{crypto, wire};

use crate::*;

/// Fresh SHARE: one registry entry, one key record, a signed RegDone.
#[tokio::test]
async fn fresh_share_registers_and_acknowledges() {
    let switch = start_switch(600).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();

    let reply = alice.share().await.unwrap();
    let msg = wire::parse(&reply).unwrap();
    assert_eq!(msg.kind, MsgKind::Data);
    assert_eq!(msg.attr("msg"), Some("RegDone"));
    // The switch's reply echoes the original address fields.
    assert_eq!(msg.sender, "alice");
    assert_eq!(msg.receiver, SWITCH_NAME);

    // The reply is signed by the switch itself.
    crypto::verify_hex(
        wire::canonical_payload(&reply).as_bytes(),
        msg.signature.as_deref().expect("reply must be signed"),
        &switch.ctx.keypair.public_hex(),
    )
    .unwrap();

    assert_eq!(
        switch.ctx.keystore.find("alice").unwrap().public_key,
        alice.keypair.public_hex()
    );
    assert_eq!(switch.ctx.registry.len(), 1);
    assert!(switch.ctx.registry.contains("alice"));
}

/// Repeating a SHARE under the same name: RegFail, then the switch closes
/// the connection. The key store keeps the original record.
#[tokio::test]
async fn repeated_share_conflicts_and_closes() {
    let switch = start_switch(600).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();
    alice.share().await.unwrap();
    let original_key = switch.ctx.keystore.find("alice").unwrap().public_key;

    let reply = alice.share().await.unwrap();
    let msg = wire::parse(&reply).unwrap();
    assert_eq!(msg.attr("msg"), Some("RegFail"));

    // Connection is closed after the failure notice.
    assert_eq!(alice.recv_or_eof().await.unwrap(), None);

    // Key store unchanged; the closed connection's entry is gone.
    assert_eq!(
        switch.ctx.keystore.find("alice").unwrap().public_key,
        original_key
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!switch.ctx.registry.contains("alice"));
}

/// A second party claiming a registered name with its own key fails
/// verification — the stored record wins.
#[tokio::test]
async fn impostor_share_fails_verification() {
    let switch = start_switch(600).await.unwrap();
    let mut alice = TestClient::connect("alice", switch.addr).await.unwrap();
    alice.share().await.unwrap();

    let mut impostor = TestClient::connect("alice", switch.addr).await.unwrap();
    let reply = impostor.share().await.unwrap();
    assert_eq!(
        wire::parse(&reply).unwrap().attr("msg"),
        Some("VerificationFail")
    );
    assert_eq!(impostor.recv_or_eof().await.unwrap(), None);

    // The genuine registration is untouched.
    assert_eq!(
        switch.ctx.keystore.find("alice").unwrap().public_key,
        alice.keypair.public_hex()
    );
}

/// A SHARE with no #pubkey attribute has no resolvable key and fails closed.
#[tokio::test]
async fn share_without_pubkey_fails_closed() {
    let switch = start_switch(600).await.unwrap();
    let mut client = TestClient::connect("noKey", switch.addr).await.unwrap();

    let msg = Message::new(MsgKind::Share, "noKey", SWITCH_NAME);
    client.send_signed(&msg).await.unwrap();

    let reply = client.recv_line().await.unwrap();
    assert_eq!(
        wire::parse(&reply).unwrap().attr("msg"),
        Some("VerificationFail")
    );
    assert_eq!(client.recv_or_eof().await.unwrap(), None);
    assert!(switch.ctx.registry.is_empty());
    assert!(switch.ctx.keystore.is_empty());
}

/// Unsigned frames fail verification; registry stays untouched when the
/// connection never had a binding.
#[tokio::test]
async fn unsigned_frame_fails_closed() {
    let switch = start_switch(600).await.unwrap();
    let mut client = TestClient::connect("alice", switch.addr).await.unwrap();

    client.send_line("DATA #temp 30 @alice ^bob").await.unwrap();

    let reply = client.recv_line().await.unwrap();
    assert_eq!(
        wire::parse(&reply).unwrap().attr("msg"),
        Some("VerificationFail")
    );
    assert_eq!(client.recv_or_eof().await.unwrap(), None);
    assert!(switch.ctx.registry.is_empty());
}

/// Malformed frames terminate the connection with no reply at all.
#[tokio::test]
async fn malformed_frame_closes_silently() {
    let switch = start_switch(600).await.unwrap();
    let mut client = TestClient::connect("alice", switch.addr).await.unwrap();

    client.send_line("HELLO #there @alice").await.unwrap();
    assert_eq!(client.recv_or_eof().await.unwrap(), None);
    assert!(switch.ctx.registry.is_empty());
}
