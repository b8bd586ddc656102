use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wopi_host::WopiConfig;
use wopi_host_server::{app_router, AppState, LocalFileRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WopiConfig::from_env();
    if config.discovery_endpoint.is_none() {
        tracing::warn!(
            "WOPI_DISCOVERY_ENDPOINT is not set; editor launch and proof verification are disabled"
        );
    }

    let repository = Arc::new(LocalFileRepository::new(config.storage_root.clone()));
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, repository));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "wopi host listening");

    axum::serve(listener, app_router(state)).await?;
    Ok(())
}
