//! Hearth processing
//!
//! Turns an uploaded byte stream into a stored original plus its derived
//! assets (preview, thumbnail, web copy) and EXIF metadata.
//!
//! Only storing the original is fatal. Every enrichment step is best-effort
//! and reports a warning on the [`IngestionResult`](hearth_core::IngestionResult)
//! instead of failing the upload.

pub mod command;
pub mod compression;
pub mod converter;
pub mod error;
pub mod image;
pub mod metadata;
pub mod upload;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use compression::WebOptimizer;
pub use converter::{ExternalConverter, FfmpegFrameExtractor, FormatConverter, HeifConverter};
pub use error::ProcessingError;
pub use crate::image::ThumbnailGenerator;
pub use metadata::{ExifMetadataExtractor, MetadataExtractor};
pub use upload::{IngestionOrchestrator, MediaPipeline, UploadSource};
