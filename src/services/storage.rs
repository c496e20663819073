//! Upload storage for image files.
//!
//! Files are written flat into the uploads directory as
//! `{YYYYmmdd_HHMMSS}_{nonce}_{sanitized name}`. The timestamp keeps the
//! directory roughly chronological and the nonce keeps same-second uploads
//! of the same file from colliding.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Length of the random component in stored names.
const NONCE_LEN: usize = 8;

/// Nonce alphabet without `_` so stored names split cleanly.
const NONCE_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Metadata for a file written to storage.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Sanitized original filename.
    pub filename: String,
    /// Unique name inside the uploads directory.
    pub stored_name: String,
    pub path: PathBuf,
    pub content_type: String,
    pub size_bytes: usize,
    /// Pixel dimensions, when the header is recognizable.
    pub dimensions: Option<(u32, u32)>,
}

/// Filesystem storage for uploaded images.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    root: PathBuf,
    max_upload_size: usize,
    allowed_extensions: Vec<String>,
}

impl UploadStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.uploads_path),
            max_upload_size: config.max_upload_size,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    /// Create the uploads directory if needed.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create uploads directory: {}", e)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_size(&self) -> usize {
        self.max_upload_size
    }

    /// Check extension and size before anything touches the disk.
    pub fn validate(&self, filename: &str, size: usize) -> Result<()> {
        let extension = file_extension(filename)
            .ok_or_else(|| Error::InvalidFileType(format!("{} has no extension", filename)))?;

        if !self.allowed_extensions.iter().any(|e| *e == extension) {
            return Err(Error::InvalidFileType(format!(
                "{} (allowed: {})",
                extension,
                self.allowed_extensions.join(", ")
            )));
        }

        if size > self.max_upload_size {
            return Err(Error::FileTooLarge {
                max_size: self.max_upload_size,
            });
        }

        Ok(())
    }

    /// Validate and write an uploaded file.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<StoredFile> {
        self.validate(original_name, data.len())?;

        let filename = sanitize_filename(original_name);
        let stored_name = format!(
            "{}_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            nanoid::nanoid!(NONCE_LEN, &NONCE_ALPHABET),
            filename
        );
        let path = self.root.join(&stored_name);

        self.ensure_dir().await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create {}: {}", stored_name, e)))?;
        let written = match file.write_all(data).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove partial upload {}: {}", stored_name, remove_err);
            }
            return Err(Error::Internal(format!(
                "Failed to write {}: {}",
                stored_name, e
            )));
        }

        let dimensions = imagesize::blob_size(data)
            .ok()
            .map(|size| (size.width as u32, size.height as u32));

        debug!(
            stored_name = %stored_name,
            size = data.len(),
            ?dimensions,
            "Stored upload"
        );

        Ok(StoredFile {
            content_type: content_type_for(&filename),
            filename,
            stored_name,
            path,
            size_bytes: data.len(),
            dimensions,
        })
    }

    /// Resolve a stored name to a path inside the uploads directory.
    pub fn path_for(&self, stored_name: &str) -> Result<PathBuf> {
        let is_plain = !stored_name.is_empty()
            && !stored_name.starts_with('.')
            && !stored_name.contains(['/', '\\'])
            && !stored_name.contains("..");

        if !is_plain {
            return Err(Error::InvalidInput(format!(
                "Invalid file name: {}",
                stored_name
            )));
        }

        Ok(self.root.join(stored_name))
    }

    /// Read a stored file.
    pub async fn read(&self, stored_name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(stored_name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|_| Error::FileNotFound(stored_name.to_string()))
    }

    /// Remove a stored file. Missing files are logged, not errors.
    pub async fn remove(&self, stored_name: &str) -> Result<()> {
        let path = self.path_for(stored_name)?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to delete upload {}: {}", stored_name, e);
        }
        Ok(())
    }
}

/// Reduce a client-supplied filename to a safe ASCII name.
///
/// Path components are dropped, whitespace becomes `_`, and anything
/// outside `[A-Za-z0-9._-]` is removed. Leading dots and underscores are
/// stripped so the result can't be hidden or empty-stemmed.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = cleaned.trim_start_matches(['.', '_']);
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercased extension of a filename.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Content type guessed from the filename.
pub fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
