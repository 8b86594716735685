//! QoE collection harness.
//!
//! Sidecar HTTP service for end-to-end test runs: serves the harness page,
//! collects periodic connection-statistics batches into a shared JSON array
//! and media-chunk uploads into per-file recordings. The browser automation
//! driving the client runs outside this process.

mod recordings;
mod stats;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::stats::StatsSink;

/// Harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct HarnessConfig {
    /// Address the listener binds.
    listen_ip: IpAddr,

    /// Port the listener binds.
    listen_port: u16,

    /// Directory of static harness files.
    public_dir: PathBuf,

    /// Shared stats file all clients append to.
    stats_file: PathBuf,

    /// Directory recordings accumulate in.
    recordings_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            listen_ip: [0, 0, 0, 0].into(),
            listen_port: 4000,
            public_dir: PathBuf::from("public"),
            stats_file: PathBuf::from("stats/stats.json"),
            recordings_dir: PathBuf::from("recordings"),
        }
    }
}

impl HarnessConfig {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    stats: Arc<StatsSink>,
    config: Arc<HarnessConfig>,
}

async fn post_stats(
    State(state): State<AppState>,
    Json(batch): Json<serde_json::Value>,
) -> StatusCode {
    match state.stats.append(&state.config.stats_file, batch).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!("failed to save stats: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn post_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let name = field.file_name().unwrap_or("chunk.bin").to_string();
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
                };
                return match recordings::append_chunk(&state.config.recordings_dir, &name, &data)
                    .await
                {
                    Ok(_) => (StatusCode::OK, String::new()),
                    Err(e) => {
                        error!("failed to append media chunk: {e}");
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    }
                };
            }
            Ok(Some(_)) => continue,
            Ok(None) => return (StatusCode::BAD_REQUEST, "No file uploaded.".to_string()),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
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
        Some(path) => HarnessConfig::load(Path::new(&path))?,
        None => HarnessConfig::default(),
    };

    if let Some(parent) = config.stats_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("failed to create stats directory")?;
    }
    StatsSink::create_file(&config.stats_file)
        .await
        .context("failed to seed stats file")?;
    tokio::fs::create_dir_all(&config.recordings_dir)
        .await
        .context("failed to create recordings directory")?;

    let state = AppState {
        stats: Arc::new(StatsSink::new()),
        config: Arc::new(config.clone()),
    };
    let app = Router::new()
        .route("/stats", post(post_stats))
        .route("/videos", post(post_video))
        .fallback_service(ServeDir::new(&config.public_dir))
        .with_state(state);

    let addr = SocketAddr::from((config.listen_ip, config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("harness running on {addr}");
    axum::serve(listener, app).await.context("harness failed")?;

    Ok(())
}
