//! Uploads Routes
//!
//! Serves stored image files so clients can display them.
//!
//! Routes:
//! - GET /uploads/:stored_name - Image bytes

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::Response,
    routing::get,
    Router,
};

use crate::{AppState, Error, Result};

/// Build upload file routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/:stored_name", get(serve_upload))
}

/// Serve a stored image.
///
/// GET /uploads/:stored_name
#[axum::debug_handler]
async fn serve_upload(
    State(state): State<AppState>,
    Path(stored_name): Path<String>,
) -> Result<Response> {
    let (data, content_type) = state.labeling.read_upload(&stored_name).await?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from(data))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
