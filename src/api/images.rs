//! Images Routes
//!
//! Single-image reads, label corrections and deletion.
//!
//! Routes:
//! - GET /images/:image_id - Get an image record
//! - DELETE /images/:image_id - Delete an image and its file
//! - PUT /images/:image_id/label - Set a human label

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::Image;
use crate::{AppState, Result};

/// Build image routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:image_id", get(get_image).delete(delete_image))
        .route("/:image_id/label", put(update_label))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to set an image label.
#[derive(Debug, Deserialize)]
pub struct UpdateLabelRequest {
    #[serde(default)]
    pub label: String,
    /// Defaults to true: a human picking a label is a verification.
    #[serde(default = "default_verified")]
    pub is_verified: bool,
}

fn default_verified() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct UpdateLabelResponse {
    pub success: bool,
    pub image: Image,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub success: bool,
    pub id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get an image record.
///
/// GET /images/:image_id
#[axum::debug_handler]
async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<Image>> {
    let image = state.labeling.get_image(&image_id).await?;
    Ok(Json(image))
}

/// Set a human label on an image.
///
/// PUT /images/:image_id/label
#[axum::debug_handler]
async fn update_label(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    Json(request): Json<UpdateLabelRequest>,
) -> Result<Json<UpdateLabelResponse>> {
    let image = state
        .labeling
        .update_label(&image_id, &request.label, request.is_verified)
        .await?;

    Ok(Json(UpdateLabelResponse {
        success: true,
        image,
    }))
}

/// Delete an image and its stored file.
///
/// DELETE /images/:image_id
#[axum::debug_handler]
async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<DeleteImageResponse>> {
    state.labeling.delete_image(&image_id).await?;
    Ok(Json(DeleteImageResponse {
        success: true,
        id: image_id,
    }))
}
