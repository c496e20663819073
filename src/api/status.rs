//! Status Routes
//!
//! Health checks and status endpoints.
//!
//! Routes:
//! - GET /health - Basic health check with inference provider state
//! - GET /status - Detailed system status

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{self, PoolStats};
use crate::services::InferenceStatus;
use crate::{AppState, Result};

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize startup time. Call this once at server start.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.get_or_init(Instant::now);
}

/// Get uptime in seconds since server start.
fn get_uptime_seconds() -> u64 {
    STARTUP_TIME.get().map(|start| start.elapsed().as_secs()).unwrap_or(0)
}

/// Public routes: `/health`.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Token-protected routes: `/status`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(system_status))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub inference: InferenceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// System status response.
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseStatus,
    pub inference: InferenceStatus,
    pub counts: LabelCounts,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    pub pool: PoolStats,
}

#[derive(Debug, Default, Serialize)]
pub struct LabelCounts {
    pub projects: i64,
    pub images: i64,
    pub verified: i64,
    pub unverified: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Basic health check.
///
/// GET /health
///
/// Always answers while the process is up. Reports `degraded` when
/// every inference provider has been failing.
#[axum::debug_handler]
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let inference = state.inference.status().await;

    Json(HealthResponse {
        status: if inference.available {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now(),
        inference,
    })
}

/// Detailed system status.
///
/// GET /status
#[axum::debug_handler]
async fn system_status(State(state): State<AppState>) -> Result<Json<SystemStatusResponse>> {
    let connected = db::health_check(&state.db).await.is_ok();
    let inference = state.inference.status().await;

    let counts = if connected {
        let projects = db::count_projects(&state.db).await?;
        let (images, verified) = db::count_images(&state.db).await?;
        LabelCounts {
            projects,
            images,
            verified,
            unverified: images - verified,
        }
    } else {
        LabelCounts::default()
    };

    let status = match (connected, inference.available) {
        (true, true) => HealthStatus::Healthy,
        (true, false) => HealthStatus::Degraded,
        (false, _) => HealthStatus::Unhealthy,
    };

    Ok(Json(SystemStatusResponse {
        status,
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: get_uptime_seconds(),
        database: DatabaseStatus {
            connected,
            pool: db::get_pool_stats(&state.db),
        },
        inference,
        counts,
    }))
}
