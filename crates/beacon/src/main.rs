//! `beacon-server`: a standalone Beacon server with HMAC bearer tokens and
//! in-memory notification storage.
//!
//! Reads `beacon.toml` from the working directory (or the path in
//! `BEACON_CONFIG`), applies `BEACON_*` overrides, and runs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use beacon::prelude::*;

const DEFAULT_CONFIG_PATH: &str = "beacon.toml";

#[tokio::main]
async fn main() -> Result<(), BeaconError> {
    beacon::telemetry::init_tracing();

    let path = std::env::var_os("BEACON_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = BeaconConfig::load(&path)?;
    let verifier = HmacTokenVerifier::new(config.require_token_secret()?);
    tracing::info!(config = ?config, "configuration loaded");

    let server = BeaconServerBuilder::new()
        .config(config)
        .build(verifier, Arc::new(InMemoryNotificationStore::new()))
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await
}
