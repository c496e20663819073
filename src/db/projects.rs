//! Project database queries.
//!
//! Projects are the top-level organizational unit: each owns an ordered
//! label set and the images labeled against it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// Raw project row. Labels are stored as a JSON array.
#[derive(Debug, Clone, FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    labels: String,
    created_at: String,
    updated_at: String,
}

/// Project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    /// Check whether a label belongs to this project's label set.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl TryFrom<ProjectRow> for Project {
    type Error = Error;

    fn try_from(row: ProjectRow) -> Result<Self> {
        let labels: Vec<String> = serde_json::from_str(&row.labels).map_err(|e| {
            Error::Internal(format!("Corrupt label set for project {}: {}", row.id, e))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            labels,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Project with image counts, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub image_count: i64,
    pub verified_count: i64,
}

/// Input for creating a new project.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
}

// ============================================================================
// Queries
// ============================================================================

/// Create a new project.
pub async fn create_project(pool: &DbPool, input: CreateProject) -> Result<Project> {
    let labels_json = serde_json::to_string(&input.labels)
        .map_err(|e| Error::Internal(format!("Failed to encode labels: {}", e)))?;

    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO projects (id, name, labels)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.name)
    .bind(&labels_json)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Get a project by ID.
pub async fn get_project(pool: &DbPool, id: &str) -> Result<Project> {
    sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Project not found: {}", id)))?
        .try_into()
}

/// Get a project with its image counts.
pub async fn get_project_summary(pool: &DbPool, id: &str) -> Result<ProjectSummary> {
    let project = get_project(pool, id).await?;
    let (image_count, verified_count) = count_project_images(pool, id).await?;

    Ok(ProjectSummary {
        project,
        image_count,
        verified_count,
    })
}

/// List all projects with image counts, newest first.
pub async fn list_project_summaries(pool: &DbPool) -> Result<Vec<ProjectSummary>> {
    let rows: Vec<(String, String, String, String, String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT p.id, p.name, p.labels, p.created_at, p.updated_at,
               COUNT(i.id),
               COALESCE(SUM(i.is_verified), 0)
        FROM projects p
        LEFT JOIN images i ON i.project_id = p.id
        GROUP BY p.id
        ORDER BY p.created_at DESC, p.rowid DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(
            |(id, name, labels, created_at, updated_at, image_count, verified_count)| {
                let project = Project::try_from(ProjectRow {
                    id,
                    name,
                    labels,
                    created_at,
                    updated_at,
                })?;
                Ok(ProjectSummary {
                    project,
                    image_count,
                    verified_count,
                })
            },
        )
        .collect()
}

/// Delete a project and its images in one transaction.
///
/// Returns the stored file names of every deleted image. Rows inserted
/// after the commit fail their foreign key, so no image row outlives the
/// project unreported.
pub async fn delete_project(pool: &DbPool, id: &str) -> Result<Vec<String>> {
    let mut tx = pool.begin().await?;

    let stored_names: Vec<(String,)> =
        sqlx::query_as("DELETE FROM images WHERE project_id = ? RETURNING stored_name")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(Error::NotFound(format!("Project not found: {}", id)));
    }

    tx.commit().await?;

    Ok(stored_names.into_iter().map(|(name,)| name).collect())
}

/// Count total projects.
pub async fn count_projects(pool: &DbPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Count (total, verified) images in a project.
pub async fn count_project_images(pool: &DbPool, project_id: &str) -> Result<(i64, i64)> {
    let counts: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(is_verified), 0) FROM images WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;
    Ok(counts)
}
