//! Types for the upload pipeline.

use std::fmt;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use hearth_core::MediaKind;
use tokio::io::AsyncRead;

/// One inbound upload. The reader is consumed by the orchestrator.
pub struct UploadSource {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// As sent by the client; sanitized before it touches the filesystem.
    pub original_filename: String,
    pub mime_type: String,
    pub kind: MediaKind,
    /// Determines the `{YYYY}/{MM}` partition.
    pub received_at: DateTime<Utc>,
}

impl UploadSource {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
        kind: MediaKind,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            original_filename: original_filename.into(),
            mime_type: mime_type.into(),
            kind,
            received_at: Utc::now(),
        }
    }

    pub fn from_bytes(
        bytes: Vec<u8>,
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
        kind: MediaKind,
    ) -> Self {
        Self::new(Cursor::new(bytes), original_filename, mime_type, kind)
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource")
            .field("original_filename", &self.original_filename)
            .field("mime_type", &self.mime_type)
            .field("kind", &self.kind)
            .field("received_at", &self.received_at)
            .finish_non_exhaustive()
    }
}

/// Enrichment branch chosen from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPipeline {
    /// Convert to JPEG, then metadata and thumbnail from the preview
    Heic,
    /// Metadata, thumbnail and web copy from the original
    Image,
    /// Thumbnail from an extracted frame
    Video,
}

impl MediaPipeline {
    /// `None` for MIME types that get no enrichment at all.
    pub fn for_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if Self::is_heic(&essence) {
            Some(MediaPipeline::Heic)
        } else if essence.starts_with("image/") {
            Some(MediaPipeline::Image)
        } else if essence.starts_with("video/") {
            Some(MediaPipeline::Video)
        } else {
            None
        }
    }

    pub fn is_heic(mime_type: &str) -> bool {
        matches!(
            mime_type.trim().to_ascii_lowercase().as_str(),
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence"
        )
    }
}
