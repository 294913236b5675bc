//! Per-connection protocol handling.
//!
//! Each accepted socket gets two tasks: the handler (reads frames, runs the
//! protocol state machine, schedules keepalives) and the outbound writer
//! (drains the connection's single-consumer frame queue). The queue's
//! sender side is what the registry hands to other connections for routing.

pub mod handler;
pub mod outbound;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::SwitchContext;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Spawn the handler and writer tasks for one accepted connection.
pub fn spawn(
    ctx: Arc<SwitchContext>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    shutdown: broadcast::Receiver<()>,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (read_half, write_half) = stream.into_split();

    tokio::spawn(outbound::write_loop(write_half, outbound_rx, peer_addr));

    let handler = handler::ConnHandler::new(ctx, next_conn_id(), peer_addr, outbound_tx);
    tokio::spawn(handler.run(read_half, shutdown));
}
