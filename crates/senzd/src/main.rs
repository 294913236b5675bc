//! senzd — the senz message switch daemon.

use anyhow::Result;
use tokio::sync::broadcast;

use senz_core::config::SenzConfig;
use senzd::Switch;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = SenzConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = SenzConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SenzConfig::default()
    });

    let switch = Switch::bind(&config).await?;
    tracing::info!(
        addr = %switch.local_addr()?,
        name = %config.identity.switch_name,
        keepalive_secs = config.keepalive.interval_secs,
        "senzd listening"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    switch.run(shutdown_rx).await
}
