//! Image database queries.
//!
//! An image row carries its current label assignment (label, confidence,
//! verified flag). Verified labels are authoritative: model updates go
//! through `set_prediction`, which only touches unverified rows.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// Image record from the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub project_id: String,
    /// Sanitized original filename.
    pub filename: String,
    /// Unique name of the file inside the uploads directory.
    pub stored_name: String,
    pub filepath: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a new image.
#[derive(Debug, Clone)]
pub struct CreateImage {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    pub stored_name: String,
    pub filepath: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub label: Option<String>,
    pub confidence: Option<f64>,
}

// ============================================================================
// Queries
// ============================================================================

/// Create a new image. New images are always unverified.
pub async fn create_image(pool: &DbPool, input: CreateImage) -> Result<Image> {
    sqlx::query_as::<_, Image>(
        r#"
        INSERT INTO images (
            id, project_id, filename, stored_name, filepath, content_type,
            size_bytes, width, height, label, confidence, is_verified
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.project_id)
    .bind(&input.filename)
    .bind(&input.stored_name)
    .bind(&input.filepath)
    .bind(&input.content_type)
    .bind(input.size_bytes)
    .bind(input.width)
    .bind(input.height)
    .bind(&input.label)
    .bind(input.confidence)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            Error::NotFound(format!("Project not found: {}", input.project_id))
        }
        _ => Error::Database(e),
    })
}

/// Get an image by ID.
pub async fn get_image(pool: &DbPool, id: &str) -> Result<Image> {
    sqlx::query_as::<_, Image>("SELECT * FROM images WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Image not found: {}", id)))
}

/// List all images for a project, newest first.
pub async fn list_project_images(pool: &DbPool, project_id: &str) -> Result<Vec<Image>> {
    sqlx::query_as::<_, Image>(
        r#"
        SELECT * FROM images
        WHERE project_id = ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// List unverified images for a project, oldest first.
pub async fn list_unverified_images(pool: &DbPool, project_id: &str) -> Result<Vec<Image>> {
    sqlx::query_as::<_, Image>(
        r#"
        SELECT * FROM images
        WHERE project_id = ? AND is_verified = 0
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// List images for export in upload order, optionally only verified ones.
pub async fn list_export_images(
    pool: &DbPool,
    project_id: &str,
    verified_only: bool,
) -> Result<Vec<Image>> {
    sqlx::query_as::<_, Image>(
        r#"
        SELECT * FROM images
        WHERE project_id = ? AND (? = 0 OR is_verified = 1)
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(project_id)
    .bind(verified_only)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Apply a human label. Confidence is cleared because it described the
/// model's suggestion, not this label.
pub async fn update_image_label(
    pool: &DbPool,
    id: &str,
    label: &str,
    is_verified: bool,
) -> Result<Image> {
    sqlx::query_as::<_, Image>(
        r#"
        UPDATE images SET
            label = ?,
            confidence = NULL,
            is_verified = ?,
            updated_at = datetime('now')
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(label)
    .bind(is_verified)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Image not found: {}", id)))
}

/// Store a model prediction on an unverified image.
///
/// Returns `false` when the image is verified (or gone) and was left untouched.
pub async fn set_prediction(
    pool: &DbPool,
    id: &str,
    label: Option<&str>,
    confidence: Option<f64>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE images SET
            label = ?,
            confidence = ?,
            updated_at = datetime('now')
        WHERE id = ? AND is_verified = 0
        "#,
    )
    .bind(label)
    .bind(confidence)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an image row.
pub async fn delete_image(pool: &DbPool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM images WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Image not found: {}", id)));
    }

    Ok(())
}

/// Count (total, verified) images across all projects.
pub async fn count_images(pool: &DbPool) -> Result<(i64, i64)> {
    let counts: (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(is_verified), 0) FROM images")
            .fetch_one(pool)
            .await?;
    Ok(counts)
}
