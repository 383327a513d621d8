//! Upload pipeline: store → branch → enrich → assemble.
//!
//! Storing the original is the only fatal step. Every enrichment step either
//! yields its artifact or becomes an [`IngestionWarning`] on the result; the
//! stored original is never reverted because of one.
//!
//! [`IngestionWarning`]: hearth_core::IngestionWarning

use std::sync::Arc;

use hearth_core::{
    ArchiveConfig, DerivedAsset, IngestionResult, IngestionStage, StepOutcome, StoragePath,
};
use hearth_storage::{cleanup_files, FilePersister, PendingFiles, StorageError, StorageLocator};

use super::types::{MediaPipeline, UploadSource};
use crate::compression::WebOptimizer;
use crate::converter::{FormatConverter, HeifConverter};
use crate::error::ProcessingError;
use crate::image::ThumbnailGenerator;
use crate::metadata::{ExifMetadataExtractor, MetadataExtractor};

/// Sequences storage and enrichment for one upload at a time. Holds no
/// per-upload state and can be shared across tasks.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    locator: StorageLocator,
    persister: FilePersister,
    metadata: Arc<dyn MetadataExtractor>,
    converter: FormatConverter,
    thumbnails: ThumbnailGenerator,
    web: WebOptimizer,
}

impl IngestionOrchestrator {
    pub fn new(
        locator: StorageLocator,
        persister: FilePersister,
        metadata: Arc<dyn MetadataExtractor>,
        converter: FormatConverter,
        thumbnails: ThumbnailGenerator,
        web: WebOptimizer,
    ) -> Self {
        Self {
            locator,
            persister,
            metadata,
            converter,
            thumbnails,
            web,
        }
    }

    /// Production wiring: EXIF via kamadak-exif, `heif-convert`, `ffmpeg`.
    pub fn from_config(config: &ArchiveConfig) -> Result<Self, ProcessingError> {
        Ok(Self::new(
            StorageLocator::from_config(config),
            FilePersister::with_max_bytes(config.max_upload_bytes),
            Arc::new(ExifMetadataExtractor),
            FormatConverter::new(Arc::new(HeifConverter::from_config(config)?)),
            ThumbnailGenerator::from_config(config)?,
            WebOptimizer::from_config(config),
        ))
    }

    pub fn with_metadata_extractor(mut self, metadata: Arc<dyn MetadataExtractor>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_format_converter(mut self, converter: FormatConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_thumbnail_generator(mut self, thumbnails: ThumbnailGenerator) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    pub fn locator(&self) -> &StorageLocator {
        &self.locator
    }

    pub fn web_optimizer(&self) -> &WebOptimizer {
        &self.web
    }

    /// Where the original of `source` will be stored.
    pub fn target_path(&self, source: &UploadSource) -> StoragePath {
        self.locator
            .storage_path(source.kind, source.received_at, &source.original_filename)
    }

    /// Store the upload and run the enrichment branch for its MIME type.
    ///
    /// On error nothing is left on disk. On success every path in the result
    /// exists, and the caller owns the files from then on. If the returned
    /// future is dropped before completion, every file it created is removed.
    #[tracing::instrument(skip(self, source), fields(
        filename = %source.original_filename,
        mime_type = %source.mime_type,
        kind = %source.kind
    ))]
    pub async fn ingest(&self, mut source: UploadSource) -> Result<IngestionResult, StorageError> {
        let start = std::time::Instant::now();
        let storage = self.target_path(&source);

        let persisted = self
            .persister
            .persist(&mut source.reader, &storage.absolute)
            .await
            .map_err(|e| {
                tracing::error!(path = %storage.absolute.display(), error = %e, "Failed to store upload");
                e
            })?;

        let mut pending = PendingFiles::new();
        pending.track(&storage.absolute);

        let mut result = IngestionResult::new(
            storage,
            source.kind,
            source.mime_type,
            source.original_filename,
            persisted.size_bytes,
            persisted.digest,
        );

        match MediaPipeline::for_mime(&result.mime_type) {
            Some(MediaPipeline::Heic) => self.enrich_heic(&mut result, &mut pending).await,
            Some(MediaPipeline::Image) => self.enrich_image(&mut result, &mut pending).await,
            Some(MediaPipeline::Video) => self.enrich_video(&mut result, &mut pending).await,
            None => tracing::debug!(
                mime_type = %result.mime_type,
                "No enrichment for this MIME type"
            ),
        }

        pending.commit();
        tracing::info!(
            path = %result.storage.relative_str(),
            size_bytes = result.size_bytes,
            derived = result.derived.len(),
            warnings = result.warnings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload ingested"
        );
        Ok(result)
    }

    /// Remove every file belonging to `result`. For callers that cannot
    /// commit the catalog record.
    pub async fn discard(&self, result: &IngestionResult) {
        tracing::info!(path = %result.storage.relative_str(), "Discarding ingested files");
        cleanup_files(result.created_paths()).await;
    }

    async fn enrich_heic(&self, result: &mut IngestionResult, pending: &mut PendingFiles) {
        let original = result.storage.absolute.clone();
        let target = self.locator.preview_asset(&result.storage.relative);
        let outcome = self.converter.to_preview(&original, target).await;
        let Some(preview) = record(result, IngestionStage::Conversion, outcome) else {
            return;
        };
        let preview_path = preview.absolute.clone();
        add_asset(result, pending, preview);

        let outcome = self.metadata.extract(&preview_path).await;
        let metadata = record(result, IngestionStage::Metadata, outcome);
        result.metadata = metadata;

        let target = self.locator.thumbnail_asset(&result.storage.relative);
        let outcome = self.thumbnails.generate_image(&preview_path, target).await;
        if let Some(thumb) = record(result, IngestionStage::Thumbnail, outcome) {
            add_asset(result, pending, thumb);
        }
    }

    async fn enrich_image(&self, result: &mut IngestionResult, pending: &mut PendingFiles) {
        let original = result.storage.absolute.clone();

        let outcome = self.metadata.extract(&original).await;
        let metadata = record(result, IngestionStage::Metadata, outcome);
        result.metadata = metadata;

        let target = self.locator.thumbnail_asset(&result.storage.relative);
        let outcome = self.thumbnails.generate_image(&original, target).await;
        if let Some(thumb) = record(result, IngestionStage::Thumbnail, outcome) {
            add_asset(result, pending, thumb);
        }

        let target = self.locator.web_asset(&result.storage.relative);
        let outcome = self.web.optimize(&original, target).await;
        if let Some(web) = record(result, IngestionStage::WebOptimization, outcome) {
            add_asset(result, pending, web);
        }
    }

    async fn enrich_video(&self, result: &mut IngestionResult, pending: &mut PendingFiles) {
        let original = result.storage.absolute.clone();
        let target = self.locator.thumbnail_asset(&result.storage.relative);
        let outcome = self.thumbnails.generate_video(&original, target).await;
        if let Some(thumb) = record(result, IngestionStage::Thumbnail, outcome) {
            add_asset(result, pending, thumb);
        }
    }
}

/// Fold a step's outcome into the result, turning a failure into a warning.
fn record<T>(
    result: &mut IngestionResult,
    stage: IngestionStage,
    outcome: Result<T, ProcessingError>,
) -> Option<T> {
    match StepOutcome::from(outcome) {
        StepOutcome::Ok(value) => Some(value),
        StepOutcome::Skipped(reason) => {
            tracing::warn!(
                stage = %stage,
                path = %result.storage.relative_str(),
                reason = %reason,
                "Enrichment step skipped"
            );
            result.warn(stage, reason);
            None
        }
    }
}

fn add_asset(result: &mut IngestionResult, pending: &mut PendingFiles, asset: DerivedAsset) {
    pending.track(&asset.absolute);
    result.derived.push(asset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jpeg_bytes, stub_orchestrator};
    use hearth_core::MediaKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unknown_mime_skips_enrichment() {
        let dir = tempdir().unwrap();
        let orchestrator = stub_orchestrator(dir.path());

        let source = UploadSource::from_bytes(
            b"%PDF-1.7".to_vec(),
            "scan.pdf",
            "application/pdf",
            MediaKind::Photo,
        );
        let result = orchestrator.ingest(source).await.unwrap();

        assert!(result.storage.absolute.exists());
        assert!(result.derived.is_empty());
        assert!(result.metadata.is_none());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_discard_removes_every_created_file() {
        let dir = tempdir().unwrap();
        let orchestrator = stub_orchestrator(dir.path());

        let source =
            UploadSource::from_bytes(jpeg_bytes(64, 48), "cat.jpg", "image/jpeg", MediaKind::Photo);
        let result = orchestrator.ingest(source).await.unwrap();
        let paths = result.created_paths();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.exists()));

        orchestrator.discard(&result).await;
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_existing_derived_target_becomes_warning() {
        let dir = tempdir().unwrap();
        let orchestrator = stub_orchestrator(dir.path());
        let source =
            UploadSource::from_bytes(jpeg_bytes(64, 48), "dog.jpg", "image/jpeg", MediaKind::Photo);

        let relative = orchestrator.target_path(&source).relative;
        let stale = orchestrator.locator().web_asset(&relative);
        tokio::fs::create_dir_all(stale.absolute.parent().unwrap()).await.unwrap();
        tokio::fs::write(&stale.absolute, b"stale").await.unwrap();

        let result = orchestrator.ingest(source).await.unwrap();
        assert!(result.web().is_none());
        assert!(result.thumbnail().is_some());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].stage, IngestionStage::WebOptimization);
        assert_eq!(tokio::fs::read(&stale.absolute).await.unwrap(), b"stale");
    }
}
