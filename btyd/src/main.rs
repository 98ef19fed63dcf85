mod api;
mod config;
mod error;
mod pxe;
mod registry;
mod render;
mod resolver;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::pxe::BootArtifactInstaller;
use crate::registry::{HostRegistry, RegistryHandle};
use crate::render::Templates;
use crate::resolver::AddressResolver;
use crate::store::file::HostStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("btyd=info"))
        )
        .init();

    tracing::info!("Starting btyd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/bty/btyd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Open host store
    let store = HostStore::new(&config.store.path);
    if config.store.create_if_missing && store.init_if_missing()? {
        tracing::info!("Created empty host store at {:?}", store.path());
    }

    let initial_digest = registry::initial_digest(&store);

    // Start registry thread
    let (digest_tx, digest_rx) = watch::channel(initial_digest);
    let registry = RegistryHandle::spawn(HostRegistry::new(store, digest_tx));

    // Build API router
    let app_state = api::routes::AppState {
        registry: registry.clone(),
        digest_rx,
        resolver: Arc::new(AddressResolver::new(&config.resolver)),
        templates: Arc::new(Templates::new(&config.templates)),
        installer: Arc::new(BootArtifactInstaller::new(&config.pxe.cfg_dir)),
        pxe: Arc::new(config.pxe.clone()),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = server_handle.await;

    // Shutdown registry thread
    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
