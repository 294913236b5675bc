//! senzd — the senz message switch daemon.
//!
//! Accepts TCP connections from senzies, authenticates every inbound frame,
//! and routes traffic between live connections. The binary is a thin shell
//! over [`Switch`] so the integration harness can run a switch in-process.

pub mod conn;
pub mod listener;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use senz_core::config::SenzConfig;
use senz_core::crypto::Keypair;
use senz_services::{ConnectionRegistry, KeyStore};

/// Process-wide state shared by every connection task.
pub struct SwitchContext {
    /// The switch's own name; messages addressed here are control traffic.
    pub switch_name: String,
    /// Signing identity for switch-originated messages.
    pub keypair: Arc<Keypair>,
    /// The routing table.
    pub registry: ConnectionRegistry,
    /// Persistent name → public key directory.
    pub keystore: Arc<KeyStore>,
    /// Keepalive period for authenticated connections.
    pub keepalive: Duration,
}

/// A bound, not-yet-running switch.
pub struct Switch {
    ctx: Arc<SwitchContext>,
    listener: TcpListener,
}

impl Switch {
    /// Load identity and key store, then bind the listen socket.
    pub async fn bind(config: &SenzConfig) -> Result<Self> {
        let keypair = Arc::new(
            Keypair::load_or_generate(&config.identity.keypair_path)
                .context("failed to load switch keypair")?,
        );
        tracing::info!(public_key = %keypair.public_hex(), "switch identity ready");

        let keystore = Arc::new(
            KeyStore::open(&config.storage.keystore_path).context("failed to open key store")?,
        );
        tracing::info!(
            path = %config.storage.keystore_path.display(),
            records = keystore.len(),
            "key store open"
        );

        let addr = format!("{}:{}", config.network.listen_addr, config.network.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        let ctx = Arc::new(SwitchContext {
            switch_name: config.identity.switch_name.clone(),
            keypair,
            registry: ConnectionRegistry::new(),
            keystore,
            keepalive: Duration::from_secs(config.keepalive.interval_secs),
        });

        Ok(Self { ctx, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listen socket has no local address")
    }

    /// Shared state handle, for inspection by tests and tooling.
    pub fn context(&self) -> Arc<SwitchContext> {
        self.ctx.clone()
    }

    /// Run the accept loop until `shutdown` fires.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        listener::accept_loop(self.ctx, self.listener, shutdown).await
    }
}
