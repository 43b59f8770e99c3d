//! HTTP and WebSocket front end for the job queue.

pub mod api;
pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub use api::{AppState, SharedState};

use crate::config::ServerConfig;
use crate::jobs::JobQueue;

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router().layer(CorsLayer::permissive()).with_state(state)
}

/// Serve the API until Ctrl-C.
pub async fn start_server(config: &ServerConfig, queue: JobQueue) -> Result<()> {
    let app = build_router(Arc::new(AppState { queue }));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, "patchsmith listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => {
            warn!(error = %e, "failed to install Ctrl+C handler; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
