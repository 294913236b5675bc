//! Outbound writer — serialises all writes to one connection.
//!
//! Every frame queued for a connection (handler replies, keepalives,
//! traffic forwarded by other connection tasks) passes through this single
//! consumer, so writes to the socket never interleave. Frames are written
//! with a trailing terminator.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

pub async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    peer_addr: SocketAddr,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            tracing::debug!(%peer_addr, error = %e, "write failed, stopping writer");
            break;
        }
        if let Err(e) = write_half.write_all(b"\n").await {
            tracing::debug!(%peer_addr, error = %e, "write failed, stopping writer");
            break;
        }
    }
    // Dropping the half closes our side of the socket.
}
