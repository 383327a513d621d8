use std::path::PathBuf;

use hearth_core::AppError;
use hearth_storage::StorageError;
use thiserror::Error;

/// Enrichment failures. None of these fail an upload on their own; the
/// orchestrator turns them into warnings.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("{program} exited with {status}: {output}")]
    CommandFailed {
        program: String,
        status: String,
        output: String,
    },

    #[error("{program} timed out after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid program path: {0}")]
    InvalidProgram(String),

    #[error("Expected output file is missing: {0}")]
    MissingOutput(PathBuf),

    #[error("Output file already exists: {0}")]
    OutputExists(PathBuf),

    #[error("Thumbnail unavailable: {0}")]
    ThumbnailUnavailable(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Storage(e) => e.into(),
            ProcessingError::Io(e) => AppError::Internal(format!("IO error: {}", e)),
            ProcessingError::Join(e) => AppError::Internal(format!("Blocking task failed: {}", e)),
            other => AppError::MediaProcessing(other.to_string()),
        }
    }
}
