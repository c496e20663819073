//! Project, image and label workflow.
//!
//! Coordinates the database, upload storage and inference service:
//! uploads are stored and pre-labeled, humans correct labels, and
//! exports read the latest stored state.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{self, CreateImage, CreateProject, DbPool, Image, Project, ProjectSummary};
use crate::error::{Error, Result};
use crate::models::{new_id, Predictions};
use crate::services::export::{self, ExportDocument, ExportFormat};
use crate::services::inference::InferenceService;
use crate::services::storage::{StoredFile, UploadStorage};

/// A file received from a client, before validation.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// An accepted upload with the scores that produced its pre-label.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    #[serde(flatten)]
    pub image: Image,
    /// Every label score, best first. Empty when inference failed.
    pub predictions: Predictions,
}

/// A rejected upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// Result of an upload request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadOutcome {
    pub uploaded: Vec<UploadedImage>,
    pub skipped: Vec<SkippedFile>,
}

/// Result of re-running pre-labeling over a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepredictOutcome {
    pub updated: usize,
    /// Images verified by a human while the pass was running.
    pub skipped_verified: usize,
    pub failed: usize,
}

/// Service for the labeling workflow.
#[derive(Clone)]
pub struct LabelingService {
    db: DbPool,
    storage: Arc<UploadStorage>,
    inference: Arc<InferenceService>,
    concurrency_limit: usize,
}

impl LabelingService {
    pub fn new(
        db: DbPool,
        storage: Arc<UploadStorage>,
        inference: Arc<InferenceService>,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            db,
            storage,
            inference,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    /// Create a project with a cleaned label set.
    pub async fn create_project(&self, name: &str, labels: &[String]) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Project name cannot be empty".to_string()));
        }

        let labels = clean_labels(labels);
        if labels.is_empty() {
            return Err(Error::Validation(
                "Project needs at least one non-blank label".to_string(),
            ));
        }

        let project = db::create_project(
            &self.db,
            CreateProject {
                id: new_id(),
                name: name.to_string(),
                labels,
            },
        )
        .await?;

        info!(
            project_id = %project.id,
            name = %project.name,
            labels = project.labels.len(),
            "Project created"
        );

        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        db::list_project_summaries(&self.db).await
    }

    pub async fn get_project(&self, id: &str) -> Result<ProjectSummary> {
        db::get_project_summary(&self.db, id).await
    }

    /// Delete a project, its images and their stored files.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        let stored_names = db::delete_project(&self.db, id).await?;
        self.remove_files(&stored_names).await;

        info!(project_id = %id, images = stored_names.len(), "Project deleted");

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------------

    /// Store uploaded files and pre-label them.
    ///
    /// Files failing extension or size checks are skipped with a reason.
    /// An inference failure leaves the image stored without a label.
    pub async fn upload_images(
        &self,
        project_id: &str,
        files: Vec<UploadedFile>,
    ) -> Result<UploadOutcome> {
        let project = db::get_project(&self.db, project_id).await?;

        let mut outcome = UploadOutcome::default();
        if files.is_empty() {
            return Ok(outcome);
        }

        let mut accepted: Vec<(StoredFile, Vec<u8>)> = Vec::with_capacity(files.len());
        for file in files {
            match self.storage.save(&file.filename, &file.data).await {
                Ok(stored) => accepted.push((stored, file.data)),
                Err(e @ (Error::InvalidFileType(_) | Error::FileTooLarge { .. })) => {
                    debug!(filename = %file.filename, reason = %e, "Skipping upload");
                    outcome.skipped.push(SkippedFile {
                        filename: file.filename,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let names: Vec<String> =
                        accepted.into_iter().map(|(s, _)| s.stored_name).collect();
                    self.remove_files(&names).await;
                    return Err(e);
                }
            }
        }

        let inference = Arc::clone(&self.inference);
        let labels: Arc<[String]> = project.labels.clone().into();
        let predicted: Vec<(StoredFile, Predictions)> = stream::iter(accepted)
            .map(move |(stored, data)| {
                let inference = Arc::clone(&inference);
                let labels = Arc::clone(&labels);
                async move {
                    let predictions = match inference.predict(&data, &labels).await {
                        Ok(predictions) => predictions,
                        Err(e) => {
                            warn!(
                                stored_name = %stored.stored_name,
                                error = %e,
                                "Pre-labeling failed, storing without label"
                            );
                            Predictions::default()
                        }
                    };
                    (stored, predictions)
                }
            })
            .buffered(self.concurrency_limit)
            .collect()
            .await;

        let mut pending = predicted.into_iter();
        while let Some((stored, predictions)) = pending.next() {
            let stored_name = stored.stored_name.clone();
            match self.record_image(&project, stored, &predictions).await {
                Ok(image) => outcome.uploaded.push(UploadedImage { image, predictions }),
                Err(e) => {
                    let mut orphans = vec![stored_name];
                    orphans.extend(pending.map(|(s, _)| s.stored_name));
                    // Rows from this request vanish with the project if it was deleted.
                    for uploaded in &outcome.uploaded {
                        if matches!(
                            db::get_image(&self.db, &uploaded.image.id).await,
                            Err(Error::NotFound(_))
                        ) {
                            orphans.push(uploaded.image.stored_name.clone());
                        }
                    }
                    self.remove_files(&orphans).await;

                    warn!(
                        project_id = %project.id,
                        removed = orphans.len(),
                        error = %e,
                        "Upload failed, removed unrecorded files"
                    );
                    return Err(e);
                }
            }
        }

        info!(
            project_id = %project.id,
            uploaded = outcome.uploaded.len(),
            skipped = outcome.skipped.len(),
            "Upload complete"
        );

        Ok(outcome)
    }

    async fn record_image(
        &self,
        project: &Project,
        stored: StoredFile,
        predictions: &Predictions,
    ) -> Result<Image> {
        let top = predictions.top();

        db::create_image(
            &self.db,
            CreateImage {
                id: new_id(),
                project_id: project.id.clone(),
                filename: stored.filename,
                stored_name: stored.stored_name,
                filepath: stored.path.to_string_lossy().into_owned(),
                content_type: stored.content_type,
                size_bytes: stored.size_bytes as i64,
                width: stored.dimensions.map(|(w, _)| i64::from(w)),
                height: stored.dimensions.map(|(_, h)| i64::from(h)),
                label: top.map(|p| p.label.clone()),
                confidence: top.map(|p| p.score),
            },
        )
        .await
    }

    /// Images in a project, newest first.
    pub async fn list_images(&self, project_id: &str) -> Result<Vec<Image>> {
        db::get_project(&self.db, project_id).await?;
        db::list_project_images(&self.db, project_id).await
    }

    pub async fn get_image(&self, id: &str) -> Result<Image> {
        db::get_image(&self.db, id).await
    }

    /// Apply a human label. The label must belong to the project.
    pub async fn update_label(&self, image_id: &str, label: &str, is_verified: bool) -> Result<Image> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::Validation("Label cannot be empty".to_string()));
        }

        let image = db::get_image(&self.db, image_id).await?;
        let project = db::get_project(&self.db, &image.project_id).await?;
        if !project.has_label(label) {
            return Err(Error::Validation(format!(
                "Label '{}' is not in project labels: {}",
                label,
                project.labels.join(", ")
            )));
        }

        let updated = db::update_image_label(&self.db, image_id, label, is_verified).await?;

        debug!(image_id = %image_id, label = %label, is_verified, "Label updated");

        Ok(updated)
    }

    /// Re-run pre-labeling for every unverified image in a project.
    pub async fn repredict(&self, project_id: &str) -> Result<RepredictOutcome> {
        let project = db::get_project(&self.db, project_id).await?;
        let images = db::list_unverified_images(&self.db, project_id).await?;

        let storage = Arc::clone(&self.storage);
        let inference = Arc::clone(&self.inference);
        let labels: Arc<[String]> = project.labels.clone().into();
        let results: Vec<(Image, Result<Predictions>)> = stream::iter(images)
            .map(move |image| {
                let storage = Arc::clone(&storage);
                let inference = Arc::clone(&inference);
                let labels = Arc::clone(&labels);
                async move {
                    let result = match storage.read(&image.stored_name).await {
                        Ok(data) => inference.predict(&data, &labels).await,
                        Err(e) => Err(e),
                    };
                    (image, result)
                }
            })
            .buffered(self.concurrency_limit)
            .collect()
            .await;

        let mut outcome = RepredictOutcome::default();
        for (image, result) in results {
            match result {
                Ok(predictions) => {
                    let top = predictions.top();
                    let applied = db::set_prediction(
                        &self.db,
                        &image.id,
                        top.map(|p| p.label.as_str()),
                        top.map(|p| p.score),
                    )
                    .await?;

                    if applied {
                        outcome.updated += 1;
                    } else {
                        outcome.skipped_verified += 1;
                    }
                }
                Err(e) => {
                    warn!(image_id = %image.id, error = %e, "Re-prediction failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            project_id = %project.id,
            updated = outcome.updated,
            skipped_verified = outcome.skipped_verified,
            failed = outcome.failed,
            "Re-prediction complete"
        );

        Ok(outcome)
    }

    /// Delete an image and its stored file.
    pub async fn delete_image(&self, id: &str) -> Result<()> {
        let image = db::get_image(&self.db, id).await?;
        db::delete_image(&self.db, id).await?;
        self.storage.remove(&image.stored_name).await?;

        debug!(image_id = %id, "Image deleted");

        Ok(())
    }

    async fn remove_files(&self, stored_names: &[String]) {
        for name in stored_names {
            if let Err(e) = self.storage.remove(name).await {
                warn!(stored_name = %name, error = %e, "Failed to remove stored file");
            }
        }
    }

    /// Read a stored image file with its content type.
    pub async fn read_upload(&self, stored_name: &str) -> Result<(Vec<u8>, String)> {
        let data = self.storage.read(stored_name).await?;
        Ok((data, crate::services::storage::content_type_for(stored_name)))
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Export the project's current labels.
    pub async fn export(
        &self,
        project_id: &str,
        format: ExportFormat,
        verified_only: bool,
    ) -> Result<ExportDocument> {
        let project = db::get_project(&self.db, project_id).await?;
        let images = db::list_export_images(&self.db, project_id, verified_only).await?;

        let document = export::render(&project, &images, format)?;

        info!(
            project_id = %project.id,
            ?format,
            verified_only,
            images = images.len(),
            "Export rendered"
        );

        Ok(document)
    }
}

/// Trim, drop blanks and deduplicate labels, keeping first-seen order.
pub fn clean_labels(labels: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim();
        if !label.is_empty() && !cleaned.iter().any(|l| l == label) {
            cleaned.push(label.to_string());
        }
    }
    cleaned
}
