use std::path::Path;

use hearth_core::{ArchiveConfig, DerivedAsset, WEBP_MAX_DIMENSION};
use image::imageops::FilterType;
use image::GenericImageView;

use crate::error::ProcessingError;
use crate::image::{fit_within, open_oriented, write_new};

/// Produces the lossy WebP copy served to browsers in place of the original.
#[derive(Debug, Clone, Copy)]
pub struct WebOptimizer {
    quality: u8,
    max_dimension: u32,
}

impl WebOptimizer {
    /// `max_dimension` is clamped to what the WebP format can hold.
    pub fn new(quality: u8, max_dimension: u32) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            max_dimension: max_dimension.clamp(1, WEBP_MAX_DIMENSION),
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(config.web_quality, config.web_max_dimension)
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Encode `source` into a WebP at `target`, upright and bounded by the
    /// configured maximum dimension. An existing target is never replaced.
    #[tracing::instrument(skip(self, target), fields(target = %target.absolute.display()))]
    pub async fn optimize(
        &self,
        source: &Path,
        target: DerivedAsset,
    ) -> Result<DerivedAsset, ProcessingError> {
        if tokio::fs::try_exists(&target.absolute).await? {
            return Err(ProcessingError::OutputExists(target.absolute));
        }

        let source = source.to_path_buf();
        let (quality, max_dimension) = (self.quality, self.max_dimension);
        let start = std::time::Instant::now();
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ProcessingError> {
            let img = open_oriented(&source)?;
            let (width, height) = img.dimensions();
            let (w, h) = fit_within(width, height, max_dimension);
            let img = if (w, h) == (width, height) {
                img
            } else {
                img.resize_exact(w, h, FilterType::Lanczos3)
            };

            let rgba = img.to_rgba8();
            let encoded = webp::Encoder::from_rgba(&rgba, w, h).encode(quality as f32);
            if encoded.is_empty() {
                return Err(ProcessingError::Encode("WebP encoder produced no data".to_string()));
            }
            Ok(encoded.to_vec())
        })
        .await??;

        write_new(&target.absolute, &bytes).await?;
        tracing::info!(
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Web copy created"
        );
        Ok(target)
    }
}
