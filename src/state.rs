//! Application state for AutoLabel.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::{InferenceService, LabelingService, UploadStorage};
use crate::{config, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Inference providers with fallback.
    pub inference: Arc<InferenceService>,
    /// Uploaded image files.
    pub storage: Arc<UploadStorage>,
    /// Project and label workflow.
    pub labeling: LabelingService,
    /// Bearer token required on protected routes, if any.
    pub api_token: Option<String>,
}

impl AppState {
    /// Create a new application state from the global configuration.
    pub async fn new() -> Result<Self> {
        Self::from_config(config::config()).await
    }

    /// Create application state from an explicit configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        // Initialize database
        let db = crate::db::init_pool(&config.database.path).await?;

        // Initialize database schema
        crate::db::initialize_schema(&db).await?;

        let inference = Arc::new(InferenceService::from_config(&config.inference)?);

        let storage = UploadStorage::new(&config.storage);
        storage.ensure_dir().await?;

        Ok(Self::from_parts(
            db,
            inference,
            Arc::new(storage),
            config.inference.concurrency_limit,
            config.server.api_token.clone(),
        ))
    }

    /// Assemble state from already-built services.
    pub fn from_parts(
        db: DbPool,
        inference: Arc<InferenceService>,
        storage: Arc<UploadStorage>,
        concurrency_limit: usize,
        api_token: Option<String>,
    ) -> Self {
        let labeling = LabelingService::new(
            db.clone(),
            storage.clone(),
            inference.clone(),
            concurrency_limit,
        );

        Self {
            db,
            inference,
            storage,
            labeling,
            api_token,
        }
    }

    /// Largest accepted upload file, in bytes.
    pub fn max_upload_size(&self) -> usize {
        self.storage.max_upload_size()
    }
}
