use std::path::Path;
use std::sync::Arc;

use hearth_core::{AppError, MediaItem};
use hearth_db::{MediaCursor, MediaRecordStore};
use hearth_processing::WebOptimizer;
use hearth_storage::{cleanup_files, StorageLocator};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Generates web copies for photos catalogued without one.
#[derive(Clone)]
pub struct WebBackfillService {
    locator: StorageLocator,
    optimizer: WebOptimizer,
    store: Arc<dyn MediaRecordStore>,
}

impl WebBackfillService {
    pub fn new(
        locator: StorageLocator,
        optimizer: WebOptimizer,
        store: Arc<dyn MediaRecordStore>,
    ) -> Self {
        Self {
            locator,
            optimizer,
            store,
        }
    }

    /// Make one pass over every photo missing a web copy, fetching
    /// `batch_size` at a time. Photos that fail are counted and stepped
    /// over, so they never hold back the ones behind them. Only listing a
    /// batch can fail the run.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, batch_size: i64) -> Result<BackfillReport, AppError> {
        let batch_size = batch_size.max(1);
        let mut report = BackfillReport::default();
        let mut cursor: Option<MediaCursor> = None;

        loop {
            let items = self
                .store
                .list_photos_missing_web(cursor, batch_size)
                .await?;
            let Some(last) = items.last() else {
                break;
            };
            cursor = Some(MediaCursor::after(last));
            tracing::info!(count = items.len(), "Backfilling web copies");

            for item in &items {
                report.processed += 1;
                match self.backfill_one(item).await {
                    Ok(web_path) => {
                        report.succeeded += 1;
                        tracing::info!(media_id = %item.id, web_path = %web_path, "Web copy generated");
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(media_id = %item.id, path = %item.path, error = %e, "Web copy failed");
                    }
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "Backfill finished"
        );
        Ok(report)
    }

    async fn backfill_one(&self, item: &MediaItem) -> Result<String, AppError> {
        // HEIC originals cannot be decoded here; their preview can.
        let source = match item.preview_path.as_deref().filter(|p| !p.is_empty()) {
            Some(preview) => preview,
            None => item.path.as_str(),
        };
        let source = self.locator.resolve(source)?;
        let target = self.locator.web_asset(Path::new(&item.path));

        let web = self.optimizer.optimize(&source, target).await?;
        let web_path = web.relative_str();
        if let Err(e) = self.store.set_web_path(item.id, &web_path).await {
            cleanup_files([&web.absolute]).await;
            return Err(e);
        }
        Ok(web_path)
    }
}
