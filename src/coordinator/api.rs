//! HTTP routes for the Coordinator server
//!
//! The WebSocket endpoint carries all worker and observer traffic; the
//! REST endpoints are read-only views for health checks and scripts.
//! Only `/api/health` is open; the stats view needs the same token as
//! the socket.

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::protocol::StatsSnapshot;
use super::server::AppState;
use super::socket::{require_token, ws_handler};

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub solved: bool,
}

/// Stats response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub uptime_secs: u64,
}

// ============================================================================
// Routes
// ============================================================================

/// Create the coordinator router
pub fn create_router(state: AppState) -> Router {
    // Everything that exposes registry state sits behind the gate
    let gated = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/stats", get(get_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/api/health", get(health_check))
        .merge(gated)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        solved: state.router.is_solved().await,
    }))
}

/// Current coordinator stats, same content observers receive
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(StatsResponse {
        stats: state.router.snapshot().await,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// ============================================================================
// Tests
// ============================================================================
