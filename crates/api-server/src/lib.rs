//! HTTP + WebSocket surface for the separation service.

pub mod config;
pub mod handlers;
pub mod types;
pub mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use unmixer_common::{ProcessingError, Result};
use unmixer_orchestrator::Orchestrator;
use unmixer_status::{ProgressNotifier, SubscriberRegistry};

pub use config::ServerConfig;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ServerConfig>,
    pub notifier: Arc<ProgressNotifier>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/upload", post(handlers::upload))
        .route("/api/status/{job_id}", get(handlers::status))
        .route("/api/download/{job_id}/{stem}", get(handlers::download))
        .route("/api/waveform/{job_id}/{stem}", get(handlers::waveform))
        .route("/api/health", get(handlers::health))
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(config::MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: ApiState) -> Result<()> {
    let addr = state.config.addr;
    tokio::fs::create_dir_all(state.config.uploads_dir()).await?;
    tokio::fs::create_dir_all(state.config.outputs_dir()).await?;

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| ProcessingError::Other(format!("server error: {e}")))?;
    Ok(())
}
