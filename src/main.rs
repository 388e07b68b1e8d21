//! Draft Sync Server - the document store the autosave engine saves to.
//!
//! - Sled embedded database for documents and accounts
//! - Axum HTTP API with bearer-token auth
//! - PATCH endpoint that receives autosaved editor snapshots

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

use draft_sync::server::{self, AppState, ServerConfig, TokenService};
use draft_sync::storage::DocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "draft_sync=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();

    info!("Initializing storage at: {}", config.storage.path);
    let store = DocumentStore::open(config.storage.clone()).context("Failed to open storage")?;
    let stats = store.stats();
    info!(
        "Storage initialized ({} documents, {} users)",
        stats.post_count, stats.user_count
    );

    let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_minutes)
        .context("Invalid token configuration")?;
    let state = Arc::new(AppState::new(store, tokens));
    let app = server::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Draft Sync server v{} starting", env!("CARGO_PKG_VERSION"));
    info!("   Listening on: http://{}", addr);
    info!("   Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.store.flush().context("Failed to flush storage")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C ({}), running until killed", e);
            std::future::pending::<()>().await;
        }
    }
}
