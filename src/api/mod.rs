//! API Routes for AutoLabel
//!
//! This module combines all API routes into a single router.
//! Routes are organized by domain and apply appropriate middleware.

mod images;
mod projects;
pub mod status;
mod uploads;

use axum::Router;

use crate::middleware::require_token;
use crate::AppState;

/// Build the complete API router.
///
/// Route structure:
/// - /health - Health check (public)
/// - /status - System status (token-protected)
/// - /projects/* - Projects, uploads, export (token-protected)
/// - /images/* - Image records and labels (token-protected)
/// - /uploads/* - Stored image files (token-protected)
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health endpoint (public)
        .merge(status::public_routes())
        // Protected API routes
        .merge(protected_routes(state))
}

/// Protected routes. Open when no API token is configured.
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/projects", projects::routes(&state))
        .nest("/images", images::routes())
        .nest("/uploads", uploads::routes())
        // Apply token authentication to all protected routes
        .layer(axum::middleware::from_fn_with_state(state, require_token))
}
