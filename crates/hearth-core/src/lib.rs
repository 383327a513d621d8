//! Hearth Core Library
//!
//! This crate provides the domain models, error types and configuration
//! shared across all Hearth components.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{ArchiveConfig, WEBP_MAX_DIMENSION};
pub use error::{AppError, ErrorMetadata, ErrorResponse, LogLevel};
pub use models::{
    DerivedAsset, DerivedAssetKind, ExtractedMetadata, GpsCoordinates, IngestionResult,
    IngestionStage, IngestionWarning, MediaItem, MediaKind, NewMediaItem, StepOutcome,
    StoragePath,
};
