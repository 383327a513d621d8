//! Upload ingestion: store the original, then enrich it.

mod pipeline;
mod types;

pub use pipeline::IngestionOrchestrator;
pub use types::{MediaPipeline, UploadSource};
