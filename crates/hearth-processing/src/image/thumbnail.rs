use std::path::Path;
use std::sync::Arc;

use hearth_core::{ArchiveConfig, DerivedAsset};
use hearth_storage::ensure_parent_dir;
use image::imageops::FilterType;
use image::GenericImageView;

use super::{encode_jpeg, fit_within, open_oriented, write_new};
use crate::converter::{ExternalConverter, FfmpegFrameExtractor};
use crate::error::ProcessingError;

/// Generates bounded JPEG thumbnails for photos and videos.
///
/// Both entry points write to the target they are given, which the locator
/// places under `.thumbs/` with a `.jpg` extension.
#[derive(Clone)]
pub struct ThumbnailGenerator {
    max_size: u32,
    quality: u8,
    frame_at_one_second: Arc<dyn ExternalConverter>,
    first_frame: Arc<dyn ExternalConverter>,
}

impl ThumbnailGenerator {
    pub fn new(
        max_size: u32,
        quality: u8,
        frame_at_one_second: Arc<dyn ExternalConverter>,
        first_frame: Arc<dyn ExternalConverter>,
    ) -> Self {
        Self {
            max_size,
            quality,
            frame_at_one_second,
            first_frame,
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Result<Self, ProcessingError> {
        Ok(Self::new(
            config.thumbnail_size,
            config.thumbnail_quality,
            Arc::new(FfmpegFrameExtractor::at_one_second(config)?),
            Arc::new(FfmpegFrameExtractor::first_frame(config)?),
        ))
    }

    /// Thumbnail of a still image, honoring its EXIF orientation.
    pub async fn generate_image(
        &self,
        source: &Path,
        target: DerivedAsset,
    ) -> Result<DerivedAsset, ProcessingError> {
        if tokio::fs::try_exists(&target.absolute).await? {
            return Err(ProcessingError::OutputExists(target.absolute));
        }

        let source = source.to_path_buf();
        let (max_size, quality) = (self.max_size, self.quality);
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ProcessingError> {
            let img = open_oriented(&source)?;
            let (width, height) = img.dimensions();
            let (w, h) = fit_within(width, height, max_size);
            let thumb = if (w, h) == (width, height) {
                img
            } else {
                img.resize_exact(w, h, FilterType::Lanczos3)
            };
            encode_jpeg(&thumb, quality)
        })
        .await??;

        write_new(&target.absolute, &bytes).await?;
        tracing::debug!(path = %target.absolute.display(), "Thumbnail created");
        Ok(target)
    }

    /// Thumbnail of a video frame: the frame at 1s, or the first frame if
    /// that fails. The intermediate frame is removed on every path.
    pub async fn generate_video(
        &self,
        source: &Path,
        target: DerivedAsset,
    ) -> Result<DerivedAsset, ProcessingError> {
        if tokio::fs::try_exists(&target.absolute).await? {
            return Err(ProcessingError::OutputExists(target.absolute));
        }
        ensure_parent_dir(&target.absolute).await?;

        let frame_dir = target
            .absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let frame = tempfile::Builder::new()
            .prefix(".frame-")
            .suffix(".jpg")
            .tempfile_in(&frame_dir)?
            .into_temp_path();

        let extracted = match self.frame_at_one_second.convert(source, &frame).await {
            Ok(path) => path,
            Err(first_err) => {
                tracing::debug!(
                    source = %source.display(),
                    error = %first_err,
                    "Frame at 1s unavailable, retrying with first frame"
                );
                self.first_frame
                    .convert(source, &frame)
                    .await
                    .map_err(|second_err| {
                        ProcessingError::ThumbnailUnavailable(format!(
                            "frame at 1s: {}; first frame: {}",
                            first_err, second_err
                        ))
                    })?
            }
        };

        self.generate_image(&extracted, target).await
    }
}
