//! Upload service integration tests: catalog commit and rollback.
//!
//! Run with: `cargo test -p hearth-services --test upload_test`
//! Uses the in-memory catalog; no database needed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hearth_core::{AppError, ErrorMetadata, MediaItem, MediaKind, NewMediaItem};
use hearth_db::{InMemoryMediaStore, MediaCursor, MediaRecordStore};
use hearth_processing::testing::{jpeg_bytes, stub_orchestrator};
use hearth_services::{MediaUploadService, UploadRequest};
use tempfile::tempdir;
use tokio::sync::Notify;
use uuid::Uuid;

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

fn setup(base: &Path) -> (MediaUploadService, Arc<InMemoryMediaStore>) {
    let store = Arc::new(InMemoryMediaStore::new());
    let service = MediaUploadService::new(stub_orchestrator(base), store.clone());
    (service, store)
}

#[tokio::test]
async fn test_upload_commits_record() {
    let dir = tempdir().unwrap();
    let (service, store) = setup(dir.path());
    let household = Uuid::new_v4();
    let uploader = Uuid::new_v4();

    let outcome = service
        .upload(
            UploadRequest::from_bytes(household, jpeg_bytes(120, 80), "garden.jpg", "image/jpeg")
                .uploader(uploader)
                .received_at(Utc.with_ymd_and_hms(2023, 11, 5, 8, 0, 0).unwrap()),
        )
        .await
        .unwrap();

    let item = outcome.item;
    assert_eq!(item.path, "photos/2023/11/garden.jpg");
    assert_eq!(item.kind, MediaKind::Photo);
    assert_eq!(item.uploader_id, Some(uploader));
    assert_eq!(item.original_filename.as_deref(), Some("garden.jpg"));
    assert_eq!(item.sha256.len(), 64);
    assert_eq!(
        item.thumbnail_path.as_deref(),
        Some(".thumbs/photos/2023/11/garden.jpg")
    );
    assert_eq!(item.web_path.as_deref(), Some("photos/2023/11/garden.web.webp"));
    assert!(outcome.warnings.is_empty());

    assert!(store.get_by_path(household, &item.path).await.unwrap().is_some());
    for path in item.file_paths() {
        assert!(dir.path().join(path).exists(), "{path} missing");
    }

    let json = serde_json::to_value(&item).unwrap();
    assert_eq!(json["kind"], "photo");
}

#[tokio::test]
async fn test_same_name_same_month_conflicts() {
    let dir = tempdir().unwrap();
    let (service, store) = setup(dir.path());
    let household = Uuid::new_v4();
    let at = Utc.with_ymd_and_hms(2024, 8, 15, 10, 0, 0).unwrap();

    let first = service
        .upload(
            UploadRequest::from_bytes(household, jpeg_bytes(64, 64), "IMG_0001.jpg", "image/jpeg")
                .received_at(at),
        )
        .await
        .unwrap();
    let before = files_under(dir.path());
    let original_bytes = tokio::fs::read(dir.path().join(&first.item.path)).await.unwrap();

    // The `?` is stripped, so both names sanitize to the same file.
    let err = service
        .upload(
            UploadRequest::from_bytes(household, jpeg_bytes(32, 32), "IMG_0001?.jpg", "image/jpeg")
                .received_at(at),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.http_status_code(), 409);
    assert_eq!(files_under(dir.path()), before);
    assert_eq!(
        tokio::fs::read(dir.path().join(&first.item.path)).await.unwrap(),
        original_bytes
    );
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_uncatalogued_file_on_disk_conflicts_without_overwrite() {
    let dir = tempdir().unwrap();
    let (service, store) = setup(dir.path());
    let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    let stray = dir.path().join("photos/2024/02/stray.jpg");
    tokio::fs::create_dir_all(stray.parent().unwrap()).await.unwrap();
    tokio::fs::write(&stray, b"already here").await.unwrap();

    let err = service
        .upload(
            UploadRequest::from_bytes(Uuid::new_v4(), jpeg_bytes(16, 16), "stray.jpg", "image/jpeg")
                .received_at(at),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(tokio::fs::read(&stray).await.unwrap(), b"already here");
    assert_eq!(files_under(dir.path()), vec![stray]);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_catalog_failure_removes_every_file() {
    let dir = tempdir().unwrap();
    let (service, store) = setup(dir.path());
    store.fail_next_create();

    let err = service
        .upload(UploadRequest::from_bytes(
            Uuid::new_v4(),
            jpeg_bytes(200, 150),
            "lost.jpg",
            "image/jpeg",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Database(_)));
    assert!(files_under(dir.path()).is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_invalid_kind_writes_nothing() {
    let dir = tempdir().unwrap();
    let (service, _store) = setup(dir.path());

    let err = service
        .upload(
            UploadRequest::from_bytes(Uuid::new_v4(), jpeg_bytes(8, 8), "a.jpg", "image/jpeg")
                .kind("document"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = service
        .upload(UploadRequest::from_bytes(
            Uuid::new_v4(),
            b"PK".to_vec(),
            "a.zip",
            "application/zip",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn test_kind_derived_from_mime_for_video() {
    let dir = tempdir().unwrap();
    let (service, _store) = setup(dir.path());

    let outcome = service
        .upload(UploadRequest::from_bytes(
            Uuid::new_v4(),
            vec![0u8; 512],
            "clip.mp4",
            "video/mp4",
        ))
        .await
        .unwrap();

    assert_eq!(outcome.item.kind, MediaKind::Video);
    assert!(outcome.item.path.starts_with("videos/"));
    assert!(outcome.item.thumbnail_path.is_some());
    assert!(outcome.item.width.is_none());
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemoryMediaStore::new());
    let mut config = hearth_core::ArchiveConfig::with_media_path(dir.path());
    config.max_upload_bytes = 1024;
    let orchestrator = hearth_processing::IngestionOrchestrator::from_config(&config).unwrap();
    let service = MediaUploadService::new(orchestrator, store.clone());

    let err = service
        .upload(UploadRequest::from_bytes(
            Uuid::new_v4(),
            vec![0u8; 4096],
            "huge.bin",
            "image/jpeg",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PayloadTooLarge(_)));
    assert!(files_under(dir.path()).is_empty());
    assert!(store.is_empty().await);
}

/// Catalog whose `create` never completes. Records whether the original was
/// on disk when the write started.
struct StalledCatalog {
    base: PathBuf,
    inner: InMemoryMediaStore,
    entered: Notify,
    original_on_disk: AtomicBool,
}

#[async_trait]
impl MediaRecordStore for StalledCatalog {
    async fn create(&self, item: NewMediaItem) -> Result<MediaItem, AppError> {
        self.original_on_disk
            .store(self.base.join(&item.path).exists(), Ordering::SeqCst);
        self.entered.notify_one();
        std::future::pending().await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MediaItem>, AppError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_path(
        &self,
        household_id: Uuid,
        path: &str,
    ) -> Result<Option<MediaItem>, AppError> {
        self.inner.get_by_path(household_id, path).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete(id).await
    }

    async fn list_photos_missing_web(
        &self,
        after: Option<MediaCursor>,
        limit: i64,
    ) -> Result<Vec<MediaItem>, AppError> {
        self.inner.list_photos_missing_web(after, limit).await
    }

    async fn set_web_path(&self, id: Uuid, web_path: &str) -> Result<(), AppError> {
        self.inner.set_web_path(id, web_path).await
    }
}

#[tokio::test]
async fn test_cancelled_upload_removes_files() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StalledCatalog {
        base: dir.path().to_path_buf(),
        inner: InMemoryMediaStore::new(),
        entered: Notify::new(),
        original_on_disk: AtomicBool::new(false),
    });
    let service = MediaUploadService::new(stub_orchestrator(dir.path()), store.clone());

    let upload = service.upload(UploadRequest::from_bytes(
        Uuid::new_v4(),
        jpeg_bytes(120, 90),
        "interrupted.jpg",
        "image/jpeg",
    ));

    // The upload future is dropped as soon as the catalog write has started.
    tokio::select! {
        result = upload => panic!("upload finished against a stalled catalog: {result:?}"),
        _ = store.entered.notified() => {}
    }

    assert!(store.original_on_disk.load(Ordering::SeqCst));
    assert!(files_under(dir.path()).is_empty());
}
