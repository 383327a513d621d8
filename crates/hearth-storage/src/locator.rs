use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use hearth_core::{ArchiveConfig, DerivedAsset, DerivedAssetKind, MediaKind, StoragePath};

use crate::error::{StorageError, StorageResult};

const THUMBS_DIR: &str = ".thumbs";
const UNNAMED: &str = "unnamed";

/// Make an untrusted client filename safe to use as a single path component.
///
/// Path separators and NUL become `_`, the characters `<>:"|?*` are dropped
/// and leading/trailing spaces and dots are trimmed. No length limit is applied.
pub fn sanitize_filename(filename: &str) -> String {
    let replaced: String = filename
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' | '\0' => Some('_'),
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => None,
            c => Some(c),
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        UNNAMED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Computes where originals and derived assets live under the media root.
///
/// Paths are deterministic in (kind, timestamp, filename); the locator never
/// checks the disk, so two uploads with the same sanitized name in the same
/// month resolve to the same path.
#[derive(Debug, Clone)]
pub struct StorageLocator {
    base: PathBuf,
}

impl StorageLocator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(config.media_path.clone())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `{kind}s/{YYYY}/{MM}/{sanitized}` for an upload received at `at`.
    pub fn storage_path(&self, kind: MediaKind, at: DateTime<Utc>, filename: &str) -> StoragePath {
        let relative = PathBuf::from(kind.dir_name())
            .join(format!("{:04}", at.year()))
            .join(format!("{:02}", at.month()))
            .join(sanitize_filename(filename));
        StoragePath::new(&self.base, relative)
    }

    /// `.thumbs/{relative with extension replaced by .jpg}`
    pub fn thumbnail_asset(&self, original: &Path) -> DerivedAsset {
        let relative = Path::new(THUMBS_DIR).join(original.with_extension("jpg"));
        DerivedAsset::new(DerivedAssetKind::Thumbnail, &self.base, relative)
    }

    /// Sibling `{stem}.jpg` next to the original, or `{stem}.preview.jpg`
    /// when the original already carries a JPEG extension.
    pub fn preview_asset(&self, original: &Path) -> DerivedAsset {
        let is_jpeg_name = original
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
        let relative = if is_jpeg_name {
            original.with_extension("preview.jpg")
        } else {
            original.with_extension("jpg")
        };
        DerivedAsset::new(DerivedAssetKind::Preview, &self.base, relative)
    }

    /// Sibling `{stem}.web.webp` next to the original.
    pub fn web_asset(&self, original: &Path) -> DerivedAsset {
        DerivedAsset::new(
            DerivedAssetKind::Web,
            &self.base,
            original.with_extension("web.webp"),
        )
    }

    /// Resolve a catalog-relative path to an absolute path under the media root.
    pub fn resolve(&self, relative: &str) -> StorageResult<PathBuf> {
        if relative.is_empty() {
            return Err(StorageError::InvalidPath("path is empty".to_string()));
        }
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StorageError::InvalidPath(format!(
                "path escapes the media root: {}",
                relative
            )));
        }
        Ok(self.base.join(path))
    }
}
