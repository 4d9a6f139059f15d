//! Object storage for uploaded images. Only the returned URL is persisted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;

/// An upload already read into memory.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    /// Declared content type, falling back to a guess from the file name.
    pub fn mime(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| mime_guess::from_path(&self.filename).first_or_octet_stream().to_string())
    }

    /// Rejects anything that is not an image or is larger than `max_bytes`.
    pub fn check_image(&self, field: &str, max_bytes: usize) -> Result<(), AppError> {
        if !self.mime().starts_with("image/") {
            return Err(AppError::invalid(field, "Only image files are allowed"));
        }
        if self.bytes.len() > max_bytes {
            return Err(AppError::invalid(
                field,
                format!("File exceeds the {} byte limit", max_bytes),
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores the upload under `folder` and returns its public URL.
    async fn save(&self, folder: &str, upload: &MediaUpload) -> Result<String, AppError>;
}

/// Writes uploads below a directory that the HTTP router serves at `/media`.
pub struct LocalMediaStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn extension_for(upload: &MediaUpload) -> String {
    Path::new(&upload.filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&upload.mime())
                .and_then(|exts| exts.first())
                .map(|e| e.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save(&self, folder: &str, upload: &MediaUpload) -> Result<String, AppError> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;

        let name = format!("{}.{}", Uuid::new_v4(), extension_for(upload));
        tokio::fs::write(dir.join(&name), &upload.bytes).await?;

        tracing::debug!(folder, file = %name, bytes = upload.bytes.len(), "media stored");
        Ok(format!("{}/media/{}/{}", self.public_base_url, folder, name))
    }
}
