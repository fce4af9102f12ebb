//! rmsync entry point.
//!
//! Boots the sync core and keeps the background loader running until Ctrl-C.
//! Logging goes to stderr as JSON.

use anyhow::{Context, Result};
use rmsync_client::SyncContext;
use rmsync_core::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(sync_host = %config.sync_host, root_path = %config.root_path, "starting rmsync");

    let ctx = SyncContext::from_config(config).await.context("building sync context")?;
    if let Some(index) = ctx.index() {
        match index.get_stats().await {
            Ok(stats) => tracing::info!(
                documents = stats.documents,
                pages = stats.pages,
                size_bytes = stats.size_bytes,
                location = %stats.location,
                "document index ready"
            ),
            Err(e) => tracing::warn!(error = %e, "cannot read index stats"),
        }
    }

    let loader = ctx.start_loader();
    if loader.is_none() {
        tracing::warn!("no credential configured, background loader not started");
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested");

    if let Some(loader) = loader {
        loader.shutdown().await;
    }
    ctx.close().await.context("closing document index")?;

    Ok(())
}
