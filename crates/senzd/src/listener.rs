//! TCP acceptor — one connection task per inbound senzie.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::conn;
use crate::SwitchContext;

pub async fn accept_loop(
    ctx: Arc<SwitchContext>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("listener shutting down");
                return Ok(());
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(%peer_addr, "connection accepted");
                        conn::spawn(ctx.clone(), stream, peer_addr, shutdown.resubscribe());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
