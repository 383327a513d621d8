//! Hearth Services Layer
//!
//! Business services that sit between a transport (HTTP handler, CLI) and
//! the pipeline: validating uploads, committing them to the catalog, serving
//! and deleting archived files, and backfilling web copies.

pub mod backfill;
pub mod library;
pub mod upload;

pub use backfill::{BackfillReport, WebBackfillService};
pub use library::{DownloadTarget, MediaLibraryService};
pub use upload::{resolve_kind, MediaUploadService, UploadOutcome, UploadRequest};
