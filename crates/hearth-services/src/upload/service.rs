use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_core::{AppError, IngestionWarning, MediaItem, MediaKind, NewMediaItem};
use hearth_db::MediaRecordStore;
use hearth_processing::{IngestionOrchestrator, UploadSource};
use hearth_storage::PendingFiles;
use serde::Serialize;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// An upload as received from a client, before validation.
pub struct UploadRequest {
    pub household_id: Uuid,
    pub uploader_id: Option<Uuid>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub original_filename: String,
    pub mime_type: String,
    /// `photo` or `video`; derived from the MIME type when absent.
    pub kind: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

impl UploadRequest {
    pub fn new(
        household_id: Uuid,
        reader: impl AsyncRead + Send + Unpin + 'static,
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            household_id,
            uploader_id: None,
            reader: Box::new(reader),
            original_filename: original_filename.into(),
            mime_type: mime_type.into(),
            kind: None,
            received_at: None,
        }
    }

    pub fn from_bytes(
        household_id: Uuid,
        bytes: Vec<u8>,
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::new(household_id, Cursor::new(bytes), original_filename, mime_type)
    }

    pub fn uploader(mut self, uploader_id: Uuid) -> Self {
        self.uploader_id = Some(uploader_id);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }
}

/// Committed catalog record plus the enrichment steps that were skipped.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub item: MediaItem,
    pub warnings: Vec<IngestionWarning>,
}

/// Validate a declared kind, or derive one from the MIME type.
pub fn resolve_kind(declared: Option<&str>, mime_type: &str) -> Result<MediaKind, AppError> {
    match declared.map(str::trim).filter(|k| !k.is_empty()) {
        Some(kind) => kind
            .to_ascii_lowercase()
            .parse::<MediaKind>()
            .map_err(AppError::InvalidInput),
        None => MediaKind::from_mime(mime_type).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Cannot determine media type from content type '{}'",
                mime_type
            ))
        }),
    }
}

/// Stores an upload and commits it to the catalog, or leaves no trace.
#[derive(Clone)]
pub struct MediaUploadService {
    orchestrator: IngestionOrchestrator,
    store: Arc<dyn MediaRecordStore>,
}

impl MediaUploadService {
    pub fn new(orchestrator: IngestionOrchestrator, store: Arc<dyn MediaRecordStore>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Validate, ingest and catalog one upload.
    ///
    /// A record already present at the same `(household, path)` is a
    /// `Conflict` and nothing is written. Files created by this call are
    /// removed on any error, and also if this future is dropped before the
    /// catalog write completes.
    #[tracing::instrument(skip(self, request), fields(
        household_id = %request.household_id,
        filename = %request.original_filename
    ))]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, AppError> {
        let kind = resolve_kind(request.kind.as_deref(), &request.mime_type)?;
        let household_id = request.household_id;
        let uploader_id = request.uploader_id;

        let mut source = UploadSource {
            reader: request.reader,
            original_filename: request.original_filename,
            mime_type: request.mime_type,
            kind,
            received_at: Utc::now(),
        };
        if let Some(at) = request.received_at {
            source = source.received_at(at);
        }

        let path = self.orchestrator.target_path(&source).relative_str();
        if self.store.get_by_path(household_id, &path).await?.is_some() {
            tracing::info!(path = %path, "Upload rejected, path already catalogued");
            return Err(conflict(&path));
        }

        let result = self.orchestrator.ingest(source).await?;
        let mut pending = PendingFiles::new();
        for created in result.created_paths() {
            pending.track(created);
        }

        // Another upload may have committed the same path while this one ran.
        if self.store.get_by_path(household_id, &path).await?.is_some() {
            tracing::info!(path = %path, "Upload lost a race for its path, discarding files");
            pending.discard().await;
            return Err(conflict(&path));
        }

        let new_item = NewMediaItem::from_ingestion(household_id, uploader_id, &result);
        match self.store.create(new_item).await {
            Ok(item) => {
                pending.commit();
                tracing::info!(
                    media_id = %item.id,
                    path = %item.path,
                    warnings = result.warnings.len(),
                    "Upload catalogued"
                );
                Ok(UploadOutcome {
                    item,
                    warnings: result.warnings,
                })
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Catalog write failed, discarding files");
                pending.discard().await;
                Err(e)
            }
        }
    }
}

fn conflict(path: &str) -> AppError {
    AppError::Conflict(format!("A file already exists at {}", path))
}
