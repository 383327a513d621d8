use std::path::{Path, PathBuf};
use std::sync::Arc;

use hearth_core::{AppError, MediaItem};
use hearth_db::MediaRecordStore;
use hearth_storage::{cleanup_files, StorageLocator};
use uuid::Uuid;

/// A file on disk ready to be streamed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub path: PathBuf,
    pub content_type: String,
    pub filename: String,
}

/// Read and delete access to archived files.
#[derive(Clone)]
pub struct MediaLibraryService {
    locator: StorageLocator,
    store: Arc<dyn MediaRecordStore>,
}

impl MediaLibraryService {
    pub fn new(locator: StorageLocator, store: Arc<dyn MediaRecordStore>) -> Self {
        Self { locator, store }
    }

    async fn get(&self, id: Uuid) -> Result<MediaItem, AppError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media item {} not found", id)))
    }

    /// The best file to serve: web copy, then preview, then the original.
    #[tracing::instrument(skip(self), fields(media_id = %id))]
    pub async fn resolve_download(&self, id: Uuid) -> Result<DownloadTarget, AppError> {
        let item = self.get(id).await?;

        let derived = [
            (item.web_path.as_deref(), "image/webp"),
            (item.preview_path.as_deref(), "image/jpeg"),
        ];
        for (relative, content_type) in derived {
            let Some(relative) = relative.filter(|p| !p.is_empty()) else {
                continue;
            };
            let path = self.locator.resolve(relative)?;
            if tokio::fs::try_exists(&path).await? {
                return Ok(DownloadTarget {
                    filename: file_name(&path),
                    path,
                    content_type: content_type.to_string(),
                });
            }
            tracing::warn!(path = %relative, "Derived file missing, falling back");
        }

        self.original(&item).await
    }

    /// The original as uploaded, under its original filename when known.
    #[tracing::instrument(skip(self), fields(media_id = %id))]
    pub async fn resolve_original(&self, id: Uuid) -> Result<DownloadTarget, AppError> {
        let item = self.get(id).await?;
        self.original(&item).await
    }

    /// The JPEG thumbnail. `NotFound` when none was generated or the file
    /// is gone.
    #[tracing::instrument(skip(self), fields(media_id = %id))]
    pub async fn resolve_thumbnail(&self, id: Uuid) -> Result<DownloadTarget, AppError> {
        let item = self.get(id).await?;
        let relative = item
            .thumbnail_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::NotFound(format!("Media item {} has no thumbnail", id)))?;

        let path = self.locator.resolve(relative)?;
        if !tokio::fs::try_exists(&path).await? {
            tracing::warn!(path = %relative, "Thumbnail file missing");
            return Err(AppError::NotFound(format!("Thumbnail for media item {} not found", id)));
        }
        Ok(DownloadTarget {
            filename: file_name(&path),
            path,
            content_type: "image/jpeg".to_string(),
        })
    }

    async fn original(&self, item: &MediaItem) -> Result<DownloadTarget, AppError> {
        let path = self.locator.resolve(&item.path)?;
        if !tokio::fs::try_exists(&path).await? {
            tracing::error!(media_id = %item.id, path = %item.path, "Original file missing");
            return Err(AppError::NotFound(format!("File for media item {} not found", item.id)));
        }
        let filename = item
            .original_filename
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| file_name(&path));
        Ok(DownloadTarget {
            path,
            content_type: item.mime_type.clone(),
            filename,
        })
    }

    /// Remove the catalog row, then every file that belonged to it.
    #[tracing::instrument(skip(self), fields(media_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let item = self.get(id).await?;
        if !self.store.delete(id).await? {
            return Err(AppError::NotFound(format!("Media item {} not found", id)));
        }

        let mut paths = Vec::new();
        for relative in item.file_paths() {
            match self.locator.resolve(relative) {
                Ok(path) => paths.push(path),
                Err(e) => tracing::warn!(path = %relative, error = %e, "Skipping unsafe path"),
            }
        }
        cleanup_files(paths).await;

        tracing::info!(path = %item.path, "Media item deleted");
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
