//! Connection handler — the per-connection protocol state machine.
//!
//! Lifecycle: `Unauthenticated` → `Authenticated(name)` → `Closed`.
//! Every inbound frame is parsed, signature-verified, then dispatched:
//! switch-addressed control traffic (SHARE registration, PING liveness,
//! GET key lookup) is handled here; everything else is forwarded verbatim
//! to the receiver's registry entry. Processing within one connection is
//! strictly sequential.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, Interval};

use senz_core::crypto::{self, CryptoError};
use senz_core::message::{Message, MsgKind};
use senz_core::wire::RawEnvelope;
use senz_services::{ConnectionEntry, PublicKeyRecord};

use crate::SwitchContext;

/// Connection lifecycle. `Closed` is terminal — no frames are processed
/// after it, and teardown has run.
enum ConnState {
    Unauthenticated,
    Authenticated(String),
    Closed,
}

/// What the run loop does after a frame.
#[derive(Debug, PartialEq, Eq)]
enum FrameFlow {
    Continue,
    /// Authentication succeeded — (re)start the keepalive timer.
    Authenticated,
    Close,
}

#[derive(Debug, thiserror::Error)]
enum VerifyError {
    #[error("frame carries no signature")]
    Unsigned,

    #[error("no known public key for `{0}`")]
    NoKey(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub struct ConnHandler {
    ctx: Arc<SwitchContext>,
    conn_id: u64,
    peer_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Bytes>,
    state: ConnState,
}

impl ConnHandler {
    pub fn new(
        ctx: Arc<SwitchContext>,
        conn_id: u64,
        peer_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Bytes>,
    ) -> Self {
        Self {
            ctx,
            conn_id,
            peer_addr,
            outbound,
            state: ConnState::Unauthenticated,
        }
    }

    pub async fn run(mut self, read_half: OwnedReadHalf, mut shutdown: broadcast::Receiver<()>) {
        let mut lines = BufReader::new(read_half).lines();
        let mut keepalive: Option<Interval> = None;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,

                _ = maybe_tick(keepalive.as_mut()) => {
                    self.send_keepalive();
                }

                line = lines.next_line() => match line {
                    Ok(Some(line)) => match self.handle_frame(&line) {
                        FrameFlow::Continue => {}
                        FrameFlow::Authenticated => {
                            let period = self.ctx.keepalive;
                            keepalive = Some(interval_at(Instant::now() + period, period));
                        }
                        FrameFlow::Close => break,
                    },
                    Ok(None) => {
                        tracing::debug!(peer = %self.peer_addr, "remote closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %self.peer_addr, error = %e, "read failed");
                        break;
                    }
                },
            }
        }

        self.teardown();
    }

    /// Process one terminator-stripped frame.
    fn handle_frame(&mut self, line: &str) -> FrameFlow {
        let envelope = match RawEnvelope::parse(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "malformed frame, dropping connection");
                return FrameFlow::Close;
            }
        };

        if let Err(e) = self.verify_frame(&envelope) {
            let msg = &envelope.message;
            tracing::warn!(
                peer = %self.peer_addr,
                sender = %msg.sender,
                error = %e,
                "signature verification failed"
            );
            self.send_notice("msg", "VerificationFail", msg);
            return FrameFlow::Close;
        }

        let msg = &envelope.message;
        if msg.receiver == self.ctx.switch_name {
            match msg.kind {
                MsgKind::Share => self.register(msg),
                MsgKind::Ping => self.refresh(msg),
                MsgKind::Get => {
                    self.answer_get(msg);
                    FrameFlow::Continue
                }
                MsgKind::Data | MsgKind::Put => {
                    tracing::warn!(
                        peer = %self.peer_addr,
                        kind = %msg.kind,
                        "switch is not a payload destination, dropping"
                    );
                    FrameFlow::Continue
                }
            }
        } else {
            self.route(&envelope);
            FrameFlow::Continue
        }
    }

    /// Resolve the sender's public key and verify the frame's signature
    /// against the canonical payload. A SHARE from an unknown name is
    /// self-certifying: the candidate key travels in the message and is
    /// checked here before registration stores it.
    fn verify_frame(&self, envelope: &RawEnvelope) -> Result<(), VerifyError> {
        let msg = &envelope.message;
        let signature = msg.signature.as_deref().ok_or(VerifyError::Unsigned)?;

        let public_key = match self.ctx.keystore.find(&msg.sender) {
            Some(record) => record.public_key,
            None if msg.kind == MsgKind::Share => msg
                .attr("pubkey")
                .map(str::to_owned)
                .ok_or_else(|| VerifyError::NoKey(msg.sender.clone()))?,
            None => return Err(VerifyError::NoKey(msg.sender.clone())),
        };

        crypto::verify_hex(envelope.payload().as_bytes(), signature, &public_key)?;
        Ok(())
    }

    /// SHARE addressed to the switch: the registration handshake.
    fn register(&mut self, msg: &Message) -> FrameFlow {
        let name = msg.sender.clone();

        if self.ctx.keystore.find(&name).is_some() {
            tracing::info!(peer = %self.peer_addr, name = %name, "registration conflict");
            self.send_notice("msg", "RegFail", msg);
            return FrameFlow::Close;
        }

        // verify_frame already required the candidate key for unknown senders
        let Some(public_key) = msg.attr("pubkey") else {
            self.send_notice("msg", "RegFail", msg);
            return FrameFlow::Close;
        };

        if let Err(e) = self.ctx.keystore.save(PublicKeyRecord {
            name: name.clone(),
            public_key: public_key.to_string(),
        }) {
            tracing::error!(name = %name, error = %e, "failed to persist public key");
            self.send_notice("msg", "RegFail", msg);
            return FrameFlow::Close;
        }

        self.bind(name.clone());
        self.send_notice("msg", "RegDone", msg);
        tracing::info!(peer = %self.peer_addr, name = %name, "registered");
        FrameFlow::Authenticated
    }

    /// PING addressed to the switch: unconditional re-registration.
    /// This is the designed path for a client reconnecting and reclaiming
    /// its name, so there is no conflict check and no reply.
    fn refresh(&mut self, msg: &Message) -> FrameFlow {
        self.bind(msg.sender.clone());
        tracing::info!(peer = %self.peer_addr, name = %msg.sender, "liveness refresh");
        FrameFlow::Authenticated
    }

    /// GET addressed to the switch: answer a `#pubkey` lookup.
    fn answer_get(&self, msg: &Message) {
        let Some(target) = msg.attr("pubkey") else {
            tracing::warn!(peer = %self.peer_addr, "GET without #pubkey target, dropping");
            return;
        };
        match self.ctx.keystore.find(target) {
            Some(record) => self.send_notice("pubkey", &record.public_key, msg),
            None => {
                tracing::warn!(target = %target, "no public key on record, dropping GET");
            }
        }
    }

    /// Forward a frame to its receiver's live connection, verbatim.
    /// An absent or just-closed receiver is recoverable: drop and log.
    fn route(&self, envelope: &RawEnvelope) {
        let receiver = &envelope.message.receiver;
        match self.ctx.registry.get(receiver) {
            Some(entry) => {
                if entry.forward(envelope.to_frame()).is_err() {
                    tracing::warn!(receiver = %receiver, "receiver connection gone, dropping forward");
                }
            }
            None => {
                tracing::warn!(receiver = %receiver, "no route to receiver, dropping");
            }
        }
    }

    /// Bind this connection to `name` and publish it in the registry.
    fn bind(&mut self, name: String) {
        // Rebinding under a new name must not leave the old entry behind.
        if let ConnState::Authenticated(old) = &self.state {
            if *old != name {
                self.ctx.registry.remove_conn(old, self.conn_id);
            }
        }
        self.ctx
            .registry
            .put(name.clone(), ConnectionEntry::new(self.conn_id, self.outbound.clone()));
        self.state = ConnState::Authenticated(name);
    }

    /// Signed switch reply echoing the original message's address fields.
    fn send_notice(&self, key: &str, value: &str, original: &Message) {
        let reply = Message::new(
            MsgKind::Data,
            original.sender.clone(),
            original.receiver.clone(),
        )
        .with_attr(key, value);
        self.send_signed(reply);
    }

    /// Switch-originated liveness ping toward the peer, signed on the
    /// connection's behalf.
    fn send_keepalive(&self) {
        let ConnState::Authenticated(name) = &self.state else {
            return;
        };
        tracing::debug!(peer = %self.peer_addr, name = %name, "keepalive ping");
        let ping = Message::new(MsgKind::Ping, name.clone(), self.ctx.switch_name.clone());
        self.send_signed(ping);
    }

    fn send_signed(&self, message: Message) {
        let payload = message.to_payload();
        let signature = self.ctx.keypair.sign_hex(payload.as_bytes());
        let frame = format!("{payload} {signature}");
        if self.outbound.send(Bytes::from(frame)).is_err() {
            tracing::debug!(peer = %self.peer_addr, "outbound queue closed, dropping write");
        }
    }

    /// Release the connection's registry entry. Idempotent — teardown may
    /// be reached from more than one signal for the same connection.
    fn teardown(&mut self) {
        if let ConnState::Authenticated(name) =
            std::mem::replace(&mut self.state, ConnState::Closed)
        {
            if self.ctx.registry.remove_conn(&name, self.conn_id) {
                tracing::info!(peer = %self.peer_addr, name = %name, "connection released");
            }
        }
    }
}

/// Pends forever until the keepalive timer exists, so the select loop only
/// wakes on ticks for authenticated connections.
async fn maybe_tick(keepalive: Option<&mut Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
