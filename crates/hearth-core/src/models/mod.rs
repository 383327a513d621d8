pub mod ingestion;
pub mod media;

pub use ingestion::{
    DerivedAsset, DerivedAssetKind, ExtractedMetadata, GpsCoordinates, IngestionResult,
    IngestionStage, IngestionWarning, StepOutcome, StoragePath,
};
pub use media::{MediaItem, MediaKind, NewMediaItem};
