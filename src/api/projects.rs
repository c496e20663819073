//! Projects Routes
//!
//! Projects, their image uploads, re-prediction and export.
//!
//! Routes:
//! - GET /projects - List all projects
//! - POST /projects - Create a new project
//! - GET /projects/:project_id - Get project details
//! - DELETE /projects/:project_id - Delete project, images and files
//! - POST /projects/:project_id/upload - Upload images (multipart)
//! - GET /projects/:project_id/images - List images
//! - POST /projects/:project_id/predict - Re-run pre-labeling
//! - GET /projects/:project_id/export - Download labels

use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{Image, ProjectSummary};
use crate::services::{ExportFormat, RepredictOutcome, UploadOutcome, UploadedFile};
use crate::{AppState, Error, Result};

/// Multipart field names that carry image files.
const FILE_FIELDS: [&str; 2] = ["files", "file"];

/// Upload bodies may carry this many maximum-size files.
const MAX_FILES_PER_REQUEST: usize = 32;

/// Build project routes.
pub fn routes(state: &AppState) -> Router<AppState> {
    let body_limit = state
        .max_upload_size()
        .saturating_mul(MAX_FILES_PER_REQUEST);

    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:project_id", get(get_project).delete(delete_project))
        .route(
            "/:project_id/upload",
            post(upload_images).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/:project_id/images", get(list_images))
        .route("/:project_id/predict", post(repredict))
        .route("/:project_id/export", get(export_labels))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a project.
///
/// Missing fields default to empty so they fail validation with a 400.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<ProjectSummary>,
}

#[derive(Debug, Serialize)]
pub struct ListImagesResponse {
    pub images: Vec<Image>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct RepredictResponse {
    pub project_id: String,
    #[serde(flatten)]
    pub outcome: RepredictOutcome,
}

/// Query parameters for export.
#[derive(Debug, Deserialize, Default)]
pub struct ExportQuery {
    /// `json` (default), `csv` or `coco`
    pub format: Option<String>,
    /// Only include human-verified images
    #[serde(default)]
    pub verified_only: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// List all projects.
///
/// GET /projects
#[axum::debug_handler]
async fn list_projects(State(state): State<AppState>) -> Result<Json<ListProjectsResponse>> {
    let projects = state.labeling.list_projects().await?;
    Ok(Json(ListProjectsResponse { projects }))
}

/// Create a new project.
///
/// POST /projects
#[axum::debug_handler]
async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectSummary>)> {
    let project = state
        .labeling
        .create_project(&request.name, &request.labels)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectSummary {
            project,
            image_count: 0,
            verified_count: 0,
        }),
    ))
}

/// Get project details.
///
/// GET /projects/:project_id
#[axum::debug_handler]
async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectSummary>> {
    let project = state.labeling.get_project(&project_id).await?;
    Ok(Json(project))
}

/// Delete a project with its images and stored files.
///
/// DELETE /projects/:project_id
#[axum::debug_handler]
async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.labeling.delete_project(&project_id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        id: project_id,
    }))
}

/// Upload images and pre-label them.
///
/// POST /projects/:project_id/upload
///
/// Accepts multipart/form-data with one or more file fields named
/// "files" (or "file"). Other fields are ignored.
#[axum::debug_handler]
async fn upload_images(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>> {
    let mut files = Vec::new();

    let max_size = state.max_upload_size();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        if !FILE_FIELDS.contains(&field_name.as_str()) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_size))?;

        // Browsers send an empty part when no file was picked.
        if filename.is_empty() && data.is_empty() {
            continue;
        }

        files.push(UploadedFile {
            filename,
            data: data.to_vec(),
        });
    }

    let outcome = state.labeling.upload_images(&project_id, files).await?;
    Ok(Json(outcome))
}

/// Map a multipart read error, reporting an exceeded body limit as 413.
fn multipart_error(e: MultipartError, max_size: usize) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::FileTooLarge { max_size }
    } else {
        Error::InvalidInput(format!("Failed to read multipart body: {}", e))
    }
}

/// List a project's images, newest first.
///
/// GET /projects/:project_id/images
#[axum::debug_handler]
async fn list_images(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ListImagesResponse>> {
    let images = state.labeling.list_images(&project_id).await?;
    Ok(Json(ListImagesResponse { images }))
}

/// Re-run pre-labeling for unverified images.
///
/// POST /projects/:project_id/predict
#[axum::debug_handler]
async fn repredict(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<RepredictResponse>> {
    let outcome = state.labeling.repredict(&project_id).await?;
    Ok(Json(RepredictResponse {
        project_id,
        outcome,
    }))
}

/// Download the project's labels.
///
/// GET /projects/:project_id/export?format=json|csv|coco&verified_only=bool
#[axum::debug_handler]
async fn export_labels(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let format = match query.format.as_deref() {
        Some(format) => format.parse::<ExportFormat>()?,
        None => ExportFormat::default(),
    };

    let document = state
        .labeling
        .export(&project_id, format, query.verified_only)
        .await?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, document.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", document.filename),
        )
        .header(header::CONTENT_LENGTH, document.body.len())
        .body(Body::from(document.body))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
