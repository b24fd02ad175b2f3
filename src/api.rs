/// Local read-only HTTP API
/// Exposes the engine view for dashboards and scripts
///
/// This module is optional - only starts if API_ENABLED=true in settings

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info};

use crate::connection::ConnectionMode;
use crate::engine::EngineView;
use crate::models::{HistoryEntry, RoundPhase};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

/// Shared state for API handlers
#[derive(Clone)]
struct AppState {
    view: watch::Receiver<EngineView>,
    start_time: Instant,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    mode: ConnectionMode,
    phase: RoundPhase,
}

/// Query parameters for /history endpoint
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Returns engine liveness, uptime and where the round is
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (mode, phase) = {
        let view = state.view.borrow();
        (view.connection.mode, view.state.phase)
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        mode,
        phase,
    })
}

/// Full engine view
async fn state_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = state.view.borrow().clone();
    Json(view)
}

/// Crash history, newest first
async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> impl IntoResponse {
    let history: Vec<HistoryEntry> = state
        .view
        .borrow()
        .history
        .iter()
        .take(params.limit)
        .copied()
        .collect();
    Json(history)
}

/// Creates the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/history", get(history_handler))
        .with_state(state)
}

/// Starts the HTTP API server on 127.0.0.1
/// Returns a JoinHandle that can be aborted on shutdown
pub async fn start_api_server(
    config: ApiConfig,
    view: watch::Receiver<EngineView>,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        return Err("API is disabled".into());
    }

    let state = Arc::new(AppState {
        view,
        start_time: Instant::now(),
    });

    let app = create_router(state);
    let addr = format!("127.0.0.1:{}", config.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Read API listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Read API server stopped");
        }
    });

    Ok(handle)
}
