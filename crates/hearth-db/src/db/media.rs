use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{AppError, MediaItem, NewMediaItem};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Keyset position in `(created_at, id)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl MediaCursor {
    /// Position just past `item`.
    pub fn after(item: &MediaItem) -> Self {
        Self {
            created_at: item.created_at,
            id: item.id,
        }
    }
}

/// The catalog. Records are unique per `(household_id, path)`.
#[async_trait]
pub trait MediaRecordStore: Send + Sync {
    /// Insert a record. A duplicate `(household_id, path)` is a `Conflict`.
    async fn create(&self, item: NewMediaItem) -> Result<MediaItem, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MediaItem>, AppError>;

    async fn get_by_path(&self, household_id: Uuid, path: &str)
        -> Result<Option<MediaItem>, AppError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Photos without a web copy in `(created_at, id)` order, starting after
    /// `after` when given.
    async fn list_photos_missing_web(
        &self,
        after: Option<MediaCursor>,
        limit: i64,
    ) -> Result<Vec<MediaItem>, AppError>;

    async fn set_web_path(&self, id: Uuid, web_path: &str) -> Result<(), AppError>;
}

const MEDIA_COLUMNS: &str = "id, household_id, uploader_id, path, kind, mime_type, size_bytes, \
     sha256, original_filename, preview_path, thumbnail_path, web_path, taken_at, width, height, \
     camera_make, camera_model, latitude, longitude, orientation, iso, f_number, exposure_time, \
     focal_length, created_at, updated_at";

/// Postgres-backed catalog over the `media_items` table
#[derive(Clone)]
pub struct PgMediaRecordStore {
    pool: PgPool,
}

impl PgMediaRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
    }
}

#[async_trait]
impl MediaRecordStore for PgMediaRecordStore {
    #[tracing::instrument(skip(self, item), fields(db.table = "media_items", db.operation = "insert", path = %item.path))]
    async fn create(&self, item: NewMediaItem) -> Result<MediaItem, AppError> {
        let sql = format!(
            r#"
            INSERT INTO media_items (
                id, household_id, uploader_id, path, kind, mime_type, size_bytes, sha256,
                original_filename, preview_path, thumbnail_path, web_path, taken_at, width,
                height, camera_make, camera_model, latitude, longitude, orientation, iso,
                f_number, exposure_time, focal_length
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24)
            RETURNING {MEDIA_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<Postgres, MediaItem>(&sql)
            .bind(Uuid::new_v4())
            .bind(item.household_id)
            .bind(item.uploader_id)
            .bind(&item.path)
            .bind(item.kind)
            .bind(&item.mime_type)
            .bind(item.size_bytes)
            .bind(&item.sha256)
            .bind(&item.original_filename)
            .bind(&item.preview_path)
            .bind(&item.thumbnail_path)
            .bind(&item.web_path)
            .bind(item.taken_at)
            .bind(item.width)
            .bind(item.height)
            .bind(&item.camera_make)
            .bind(&item.camera_model)
            .bind(item.latitude)
            .bind(item.longitude)
            .bind(item.orientation)
            .bind(item.iso)
            .bind(item.f_number)
            .bind(&item.exposure_time)
            .bind(item.focal_length)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AppError::Conflict(format!("A file already exists at {}", item.path))
                }
                other => AppError::Database(other),
            })?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "select", db.record_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MediaItem>, AppError> {
        let sql = format!("SELECT {MEDIA_COLUMNS} FROM media_items WHERE id = $1");
        let row = sqlx::query_as::<Postgres, MediaItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "select"))]
    async fn get_by_path(
        &self,
        household_id: Uuid,
        path: &str,
    ) -> Result<Option<MediaItem>, AppError> {
        let sql =
            format!("SELECT {MEDIA_COLUMNS} FROM media_items WHERE household_id = $1 AND path = $2");
        let row = sqlx::query_as::<Postgres, MediaItem>(&sql)
            .bind(household_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "delete", db.record_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM media_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "select"))]
    async fn list_photos_missing_web(
        &self,
        after: Option<MediaCursor>,
        limit: i64,
    ) -> Result<Vec<MediaItem>, AppError> {
        let sql = format!(
            "SELECT {MEDIA_COLUMNS} FROM media_items \
             WHERE kind = 'photo' AND (web_path IS NULL OR web_path = '') \
             AND ($1::timestamptz IS NULL OR (created_at, id) > ($1::timestamptz, $2::uuid)) \
             ORDER BY created_at ASC, id ASC LIMIT $3"
        );
        let rows = sqlx::query_as::<Postgres, MediaItem>(&sql)
            .bind(after.map(|c| c.created_at))
            .bind(after.map(|c| c.id))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "update", db.record_id = %id))]
    async fn set_web_path(&self, id: Uuid, web_path: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE media_items SET web_path = $1, updated_at = NOW() WHERE id = $2")
                .bind(web_path)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Media item {} not found", id)));
        }
        Ok(())
    }
}
