use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Best-effort removal of every path in `paths`.
///
/// Empty paths and files that are already gone are skipped. Other failures
/// are logged and otherwise ignored; this never returns an error.
pub async fn cleanup_files<I, P>(paths: I)
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for path in paths {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            continue;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove file during cleanup"
            ),
        }
    }
}

/// Blocking variant of [`cleanup_files`] for use from `Drop`.
pub fn cleanup_files_blocking<I, P>(paths: I)
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for path in paths {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove file during cleanup"
            ),
        }
    }
}

/// Files written during an operation that has not committed yet.
///
/// Dropping an uncommitted guard removes every tracked file, so an upload
/// that errors out or is cancelled mid-flight leaves nothing behind.
#[derive(Debug, Default)]
pub struct PendingFiles {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl PendingFiles {
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            armed: true,
        }
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !path.as_os_str().is_empty() {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Keep the files. Returns what was tracked.
    pub fn commit(mut self) -> Vec<PathBuf> {
        self.armed = false;
        std::mem::take(&mut self.paths)
    }

    /// Remove the files now instead of waiting for `Drop`.
    pub async fn discard(mut self) {
        self.armed = false;
        cleanup_files(std::mem::take(&mut self.paths)).await;
    }
}

impl Drop for PendingFiles {
    fn drop(&mut self) {
        if self.armed && !self.paths.is_empty() {
            tracing::debug!(count = self.paths.len(), "Removing uncommitted files");
            cleanup_files_blocking(self.paths.iter());
        }
    }
}
