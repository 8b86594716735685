//! Relay signaling server.
//!
//! Serves the static browser client and one WebSocket signaling endpoint,
//! and owns the process-wide session orchestrator in front of the SFU
//! worker process.

mod config;
mod ws;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::any;
use axum::Router;
use tower_http::services::ServeDir;
use tracing::info;

use relay_engine::SessionOrchestrator;
use relay_media::WorkerProcessEngine;

use crate::config::ServerConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session orchestrator.
    pub orchestrator: Arc<SessionOrchestrator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(Path::new(&path))?,
        None => ServerConfig::default(),
    };

    info!("starting relay server");
    let engine = Arc::new(WorkerProcessEngine::new());
    let orchestrator = Arc::new(SessionOrchestrator::new(engine, config.engine.clone()));
    orchestrator
        .ensure_worker()
        .await
        .context("media worker startup failed")?;

    let state = AppState { orchestrator };
    let app = Router::new()
        .route("/server", any(ws::ws_handler))
        .fallback_service(ServeDir::new(&config.public_dir))
        .with_state(state);

    let addr = SocketAddr::from((config.listen_ip, config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("server running on {addr}");
    axum::serve(listener, app).await.context("server failed")?;

    Ok(())
}
