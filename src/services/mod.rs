//! Service layer for AutoLabel.
//!
//! Contains business logic and external service integrations:
//! - Inference (zero-shot classifiers with fallback)
//! - UploadStorage (image files on disk)
//! - Labeling (projects, uploads, label corrections)
//! - Export (JSON, CSV and COCO datasets)

pub mod export;
pub mod inference;
mod labeling;
mod storage;

pub use export::{ExportDocument, ExportFormat, ExportSummary};
pub use inference::{
    HostedClassifier, InferenceAdapter, InferenceService, InferenceStatus, PlaceholderClassifier,
};
pub use labeling::{
    clean_labels, LabelingService, RepredictOutcome, SkippedFile, UploadOutcome, UploadedFile,
    UploadedImage,
};
pub use storage::{content_type_for, sanitize_filename, StoredFile, UploadStorage};
