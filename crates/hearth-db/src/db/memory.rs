use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hearth_core::{AppError, MediaItem, MediaKind, NewMediaItem};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::media::{MediaCursor, MediaRecordStore};

/// Catalog held in process memory. Same uniqueness rules as Postgres.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    items: RwLock<HashMap<Uuid, MediaItem>>,
    fail_next_create: AtomicBool,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` fail as if the database were unreachable.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl MediaRecordStore for InMemoryMediaStore {
    async fn create(&self, item: NewMediaItem) -> Result<MediaItem, AppError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut items = self.items.write().await;
        let taken = items
            .values()
            .any(|m| m.household_id == item.household_id && m.path == item.path);
        if taken {
            return Err(AppError::Conflict(format!(
                "A file already exists at {}",
                item.path
            )));
        }

        let now = Utc::now();
        let record = MediaItem {
            id: Uuid::new_v4(),
            household_id: item.household_id,
            uploader_id: item.uploader_id,
            path: item.path,
            kind: item.kind,
            mime_type: item.mime_type,
            size_bytes: item.size_bytes,
            sha256: item.sha256,
            original_filename: item.original_filename,
            preview_path: item.preview_path,
            thumbnail_path: item.thumbnail_path,
            web_path: item.web_path,
            taken_at: item.taken_at,
            width: item.width,
            height: item.height,
            camera_make: item.camera_make,
            camera_model: item.camera_model,
            latitude: item.latitude,
            longitude: item.longitude,
            orientation: item.orientation,
            iso: item.iso,
            f_number: item.f_number,
            exposure_time: item.exposure_time,
            focal_length: item.focal_length,
            created_at: now,
            updated_at: now,
        };
        items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MediaItem>, AppError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn get_by_path(
        &self,
        household_id: Uuid,
        path: &str,
    ) -> Result<Option<MediaItem>, AppError> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .find(|m| m.household_id == household_id && m.path == path)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.items.write().await.remove(&id).is_some())
    }

    async fn list_photos_missing_web(
        &self,
        after: Option<MediaCursor>,
        limit: i64,
    ) -> Result<Vec<MediaItem>, AppError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let mut missing: Vec<MediaItem> = self
            .items
            .read()
            .await
            .values()
            .filter(|m| m.kind == MediaKind::Photo)
            .filter(|m| m.web_path.as_deref().map_or(true, str::is_empty))
            .filter(|m| after.map_or(true, |c| (m.created_at, m.id) > (c.created_at, c.id)))
            .cloned()
            .collect();
        missing.sort_by_key(|m| (m.created_at, m.id));
        missing.truncate(limit);
        Ok(missing)
    }

    async fn set_web_path(&self, id: Uuid, web_path: &str) -> Result<(), AppError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Media item {} not found", id)))?;
        item.web_path = Some(web_path.to_string());
        item.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(household_id: Uuid, path: &str, kind: MediaKind) -> NewMediaItem {
        NewMediaItem {
            household_id,
            uploader_id: None,
            path: path.to_string(),
            kind,
            mime_type: "image/jpeg".to_string(),
            size_bytes: 10,
            sha256: "00".repeat(32),
            original_filename: None,
            preview_path: None,
            thumbnail_path: None,
            web_path: None,
            taken_at: None,
            width: None,
            height: None,
            camera_make: None,
            camera_model: None,
            latitude: None,
            longitude: None,
            orientation: None,
            iso: None,
            f_number: None,
            exposure_time: None,
            focal_length: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = InMemoryMediaStore::new();
        let household = Uuid::new_v4();

        let created = store
            .create(new_item(household, "photos/2024/01/a.jpg", MediaKind::Photo))
            .await
            .unwrap();

        let by_id = store.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.path, "photos/2024/01/a.jpg");
        assert!(store
            .get_by_path(household, "photos/2024/01/a.jpg")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_by_path(Uuid::new_v4(), "photos/2024/01/a.jpg")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_path_unique_per_household() {
        let store = InMemoryMediaStore::new();
        let household = Uuid::new_v4();
        let path = "photos/2024/01/dup.jpg";

        store.create(new_item(household, path, MediaKind::Photo)).await.unwrap();
        let err = store
            .create(new_item(household, path, MediaKind::Photo))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Another household may use the same path.
        store
            .create(new_item(Uuid::new_v4(), path, MediaKind::Photo))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_fail_next_create_only_once() {
        let store = InMemoryMediaStore::new();
        store.fail_next_create();

        let household = Uuid::new_v4();
        let err = store
            .create(new_item(household, "photos/x.jpg", MediaKind::Photo))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(store.is_empty().await);

        store
            .create(new_item(household, "photos/x.jpg", MediaKind::Photo))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_web_and_set_web_path() {
        let store = InMemoryMediaStore::new();
        let household = Uuid::new_v4();
        let photo = store
            .create(new_item(household, "photos/p.jpg", MediaKind::Photo))
            .await
            .unwrap();
        store
            .create(new_item(household, "videos/v.mp4", MediaKind::Video))
            .await
            .unwrap();

        let missing = store.list_photos_missing_web(None, 10).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, photo.id);

        store.set_web_path(photo.id, "photos/p.web.webp").await.unwrap();
        assert!(store.list_photos_missing_web(None, 10).await.unwrap().is_empty());

        let err = store.set_web_path(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_web_pages_by_cursor() {
        let store = InMemoryMediaStore::new();
        let household = Uuid::new_v4();
        for name in ["a", "b", "c"] {
            store
                .create(new_item(household, &format!("photos/{name}.jpg"), MediaKind::Photo))
                .await
                .unwrap();
        }

        let first = store.list_photos_missing_web(None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let cursor = MediaCursor::after(&first[1]);
        let rest = store.list_photos_missing_web(Some(cursor), 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(first.iter().all(|m| m.id != rest[0].id));

        let end = MediaCursor::after(&rest[0]);
        assert!(store.list_photos_missing_web(Some(end), 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryMediaStore::new();
        let item = store
            .create(new_item(Uuid::new_v4(), "photos/d.jpg", MediaKind::Photo))
            .await
            .unwrap();
        assert!(store.delete(item.id).await.unwrap());
        assert!(!store.delete(item.id).await.unwrap());
        assert!(store.get_by_id(item.id).await.unwrap().is_none());
    }
}
