//! Types produced by a single ingestion attempt.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media::MediaKind;

fn to_catalog_string(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Location of a stored original, both relative to the media root and absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePath {
    pub relative: PathBuf,
    pub absolute: PathBuf,
}

impl StoragePath {
    pub fn new(base: &Path, relative: PathBuf) -> Self {
        Self {
            absolute: base.join(&relative),
            relative,
        }
    }

    /// Relative path with `/` separators, as stored in the catalog.
    pub fn relative_str(&self) -> String {
        to_catalog_string(&self.relative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedAssetKind {
    Preview,
    Thumbnail,
    Web,
}

impl fmt::Display for DerivedAssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivedAssetKind::Preview => f.write_str("preview"),
            DerivedAssetKind::Thumbnail => f.write_str("thumbnail"),
            DerivedAssetKind::Web => f.write_str("web"),
        }
    }
}

/// A file generated from the original
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAsset {
    pub kind: DerivedAssetKind,
    pub relative: PathBuf,
    pub absolute: PathBuf,
}

impl DerivedAsset {
    pub fn new(kind: DerivedAssetKind, base: &Path, relative: PathBuf) -> Self {
        Self {
            kind,
            absolute: base.join(&relative),
            relative,
        }
    }

    pub fn relative_str(&self) -> String {
        to_catalog_string(&self.relative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// EXIF-derived facts about a photo. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: Option<DateTime<Utc>>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub location: Option<GpsCoordinates>,
    pub orientation: Option<u16>,
    pub iso: Option<u32>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub focal_length: Option<f64>,
}

impl ExtractedMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Enrichment step an ingestion warning came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Conversion,
    Metadata,
    Thumbnail,
    WebOptimization,
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionStage::Conversion => f.write_str("conversion"),
            IngestionStage::Metadata => f.write_str("metadata"),
            IngestionStage::Thumbnail => f.write_str("thumbnail"),
            IngestionStage::WebOptimization => f.write_str("web_optimization"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionWarning {
    pub stage: IngestionStage,
    pub message: String,
}

impl fmt::Display for IngestionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} skipped: {}", self.stage, self.message)
    }
}

/// Outcome of a non-fatal enrichment step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    Ok(T),
    Skipped(String),
}

impl<T> StepOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            StepOutcome::Ok(value) => Some(value),
            StepOutcome::Skipped(_) => None,
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for StepOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StepOutcome::Ok(value),
            Err(e) => StepOutcome::Skipped(e.to_string()),
        }
    }
}

/// Everything a successful ingestion produced.
///
/// Every path listed here exists on disk when the result is returned. From
/// that point on the caller owns the files and must remove them (see
/// [`IngestionResult::created_paths`]) if it cannot commit the catalog record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub storage: StoragePath,
    pub kind: MediaKind,
    pub mime_type: String,
    pub original_filename: String,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the stored bytes
    pub digest: String,
    pub derived: Vec<DerivedAsset>,
    pub metadata: Option<ExtractedMetadata>,
    pub warnings: Vec<IngestionWarning>,
}

impl IngestionResult {
    pub fn new(
        storage: StoragePath,
        kind: MediaKind,
        mime_type: impl Into<String>,
        original_filename: impl Into<String>,
        size_bytes: u64,
        digest: String,
    ) -> Self {
        Self {
            storage,
            kind,
            mime_type: mime_type.into(),
            original_filename: original_filename.into(),
            size_bytes,
            digest,
            derived: Vec::new(),
            metadata: None,
            warnings: Vec::new(),
        }
    }

    pub fn derived_asset(&self, kind: DerivedAssetKind) -> Option<&DerivedAsset> {
        self.derived.iter().find(|a| a.kind == kind)
    }

    pub fn preview(&self) -> Option<&DerivedAsset> {
        self.derived_asset(DerivedAssetKind::Preview)
    }

    pub fn thumbnail(&self) -> Option<&DerivedAsset> {
        self.derived_asset(DerivedAssetKind::Thumbnail)
    }

    pub fn web(&self) -> Option<&DerivedAsset> {
        self.derived_asset(DerivedAssetKind::Web)
    }

    /// Absolute paths of every file created for this result, original first.
    pub fn created_paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.storage.absolute.clone())
            .chain(self.derived.iter().map(|a| a.absolute.clone()))
            .collect()
    }

    pub fn warn(&mut self, stage: IngestionStage, message: impl Into<String>) {
        self.warnings.push(IngestionWarning {
            stage,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_paths_lists_original_first() {
        let base = Path::new("/media");
        let storage = StoragePath::new(base, PathBuf::from("photos/2024/01/a.heic"));
        let mut result =
            IngestionResult::new(storage, MediaKind::Photo, "image/heic", "a.heic", 10, String::new());
        result.derived.push(DerivedAsset::new(
            DerivedAssetKind::Preview,
            base,
            PathBuf::from("photos/2024/01/a.jpg"),
        ));

        let paths = result.created_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], PathBuf::from("/media/photos/2024/01/a.heic"));
        assert_eq!(paths[1], PathBuf::from("/media/photos/2024/01/a.jpg"));
        assert!(result.thumbnail().is_none());
        assert_eq!(result.preview().map(|p| p.relative_str()).as_deref(), Some("photos/2024/01/a.jpg"));
    }

    #[test]
    fn test_step_outcome_from_result() {
        let ok: StepOutcome<u32> = Ok::<u32, String>(3).into();
        assert_eq!(ok.ok(), Some(3));

        let skipped: StepOutcome<u32> = Err::<u32, String>("decoder missing".to_string()).into();
        assert!(skipped.is_skipped());
        assert_eq!(skipped, StepOutcome::Skipped("decoder missing".to_string()));
    }

    #[test]
    fn test_warning_display() {
        let mut result = IngestionResult::new(
            StoragePath::new(Path::new("/m"), PathBuf::from("videos/2024/01/v.mp4")),
            MediaKind::Video,
            "video/mp4",
            "v.mp4",
            1,
            String::new(),
        );
        result.warn(IngestionStage::Thumbnail, "no frame could be extracted");
        assert_eq!(
            result.warnings[0].to_string(),
            "thumbnail skipped: no frame could be extracted"
        );
    }

    #[test]
    fn test_empty_metadata() {
        assert!(ExtractedMetadata::default().is_empty());
        let meta = ExtractedMetadata {
            iso: Some(100),
            ..Default::default()
        };
        assert!(!meta.is_empty());
    }
}
