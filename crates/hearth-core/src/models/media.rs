use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::ingestion::IngestionResult;

/// Kind of media item held by the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Top-level directory the kind is stored under.
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photos",
            MediaKind::Video => "videos",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    /// Detect the kind from a MIME type. Only `image/*` and `video/*` map to a kind.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(MediaKind::Photo)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("type must be 'photo' or 'video', got '{}'", other)),
        }
    }
}

/// Catalog record for one archived file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct MediaItem {
    pub id: Uuid,
    pub household_id: Uuid,
    pub uploader_id: Option<Uuid>,
    pub path: String,
    pub kind: MediaKind,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub original_filename: Option<String>,
    pub preview_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub web_path: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub orientation: Option<i32>,
    pub iso: Option<i32>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub focal_length: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    /// Every catalog-relative path owned by this item, original first.
    pub fn file_paths(&self) -> Vec<&str> {
        let mut paths = vec![self.path.as_str()];
        for derived in [&self.preview_path, &self.thumbnail_path, &self.web_path] {
            if let Some(p) = derived.as_deref().filter(|p| !p.is_empty()) {
                paths.push(p);
            }
        }
        paths
    }
}

/// Insert payload for a new catalog record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMediaItem {
    pub household_id: Uuid,
    pub uploader_id: Option<Uuid>,
    pub path: String,
    pub kind: MediaKind,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub original_filename: Option<String>,
    pub preview_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub web_path: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub orientation: Option<i32>,
    pub iso: Option<i32>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub focal_length: Option<f64>,
}

impl NewMediaItem {
    /// Flatten an ingestion result into catalog columns.
    pub fn from_ingestion(
        household_id: Uuid,
        uploader_id: Option<Uuid>,
        result: &IngestionResult,
    ) -> Self {
        let meta = result.metadata.clone().unwrap_or_default();
        let original_filename = if result.original_filename.is_empty() {
            None
        } else {
            Some(result.original_filename.clone())
        };

        Self {
            household_id,
            uploader_id,
            path: result.storage.relative_str(),
            kind: result.kind,
            mime_type: result.mime_type.clone(),
            size_bytes: i64::try_from(result.size_bytes).unwrap_or(i64::MAX),
            sha256: result.digest.clone(),
            original_filename,
            preview_path: result.preview().map(|a| a.relative_str()),
            thumbnail_path: result.thumbnail().map(|a| a.relative_str()),
            web_path: result.web().map(|a| a.relative_str()),
            taken_at: meta.captured_at,
            width: meta.width.and_then(|w| i32::try_from(w).ok()),
            height: meta.height.and_then(|h| i32::try_from(h).ok()),
            camera_make: meta.camera_make,
            camera_model: meta.camera_model,
            latitude: meta.location.map(|l| l.latitude),
            longitude: meta.location.map(|l| l.longitude),
            orientation: meta.orientation.map(i32::from),
            iso: meta.iso.and_then(|i| i32::try_from(i).ok()),
            f_number: meta.f_number,
            exposure_time: meta.exposure_time,
            focal_length: meta.focal_length,
        }
    }
}
