mod service;

pub use service::{resolve_kind, MediaUploadService, UploadOutcome, UploadRequest};
