use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Chain, Config, Token};
use crate::error::RootwatchError;
use crate::service::{StatusBoard, WatcherStatus};
use crate::verification::{ReconciliationVerifier, VerificationReport};
use crate::watchers::{WatcherRegistry, WatcherSummary};

/// API State
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub registry: Arc<WatcherRegistry>,
    pub verifier: Arc<ReconciliationVerifier>,
    pub status: Arc<StatusBoard>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: i64,
    pub watchers: usize,
}

/// Watcher listing response
#[derive(Debug, Serialize)]
pub struct WatchersResponse {
    pub watchers: Vec<WatcherSummary>,
    pub status: BTreeMap<String, WatcherStatus>,
}

/// Create REST API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/watchers", get(list_watchers))
        .route("/verify/:chain/:token", get(verify_commits))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let healthy = state.status.is_healthy().await;
    let watchers = state.status.snapshot().await.len();

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        uptime_seconds: state.status.uptime_seconds(),
        watchers,
    })
}

/// Registered watchers and the outcome of their last cycles
async fn list_watchers(State(state): State<ApiState>) -> Json<WatchersResponse> {
    Json(WatchersResponse {
        watchers: state.registry.summaries(),
        status: state.status.snapshot().await,
    })
}

/// Reconcile committed roots for a chain/token pair
async fn verify_commits(
    State(state): State<ApiState>,
    Path((chain, token)): Path<(String, String)>,
) -> Result<Json<VerificationReport>, AppError> {
    info!("API: Verifying commits for {} {}", chain, token);

    let chain: Chain = chain
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown chain: {}", chain)))?;
    let token: Token = token
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown token: {}", token)))?;

    state
        .config
        .ensure_pair(chain, token)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    let report = state
        .verifier
        .verify(chain, token)
        .await
        .map_err(AppError::Verification)?;

    Ok(Json(report))
}

/// API error wrapper
pub enum AppError {
    InvalidInput(String),
    NotFound(String),
    Verification(RootwatchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Verification(e) => (
                StatusCode::BAD_GATEWAY,
                format!("Verification error: {}", e),
            ),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
