use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{StorageError, StorageResult};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Bytes written and their digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFile {
    pub size_bytes: u64,
    /// Lowercase hex SHA-256
    pub digest: String,
}

/// Removes the file on drop unless disarmed. Covers early returns and
/// cancellation of the copying future alike.
struct PartialFile<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove partial file"
            ),
        }
    }
}

/// Streams an upload to its final location while hashing it.
#[derive(Debug, Clone, Default)]
pub struct FilePersister {
    max_bytes: Option<u64>,
}

impl FilePersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject streams longer than `max_bytes`.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
        }
    }

    /// Copy `reader` into a new file at `dest`.
    ///
    /// Missing parent directories are created. An existing file at `dest` is
    /// never replaced and yields [`StorageError::AlreadyExists`]. If the copy
    /// fails for any reason the partially written file is removed before the
    /// error is returned.
    pub async fn persist<R>(&self, reader: &mut R, dest: &Path) -> StorageResult<PersistedFile>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        ensure_parent_dir(dest).await?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(dest.to_path_buf()),
                _ => StorageError::CreateFile {
                    path: dest.to_path_buf(),
                    source: e,
                },
            })?;
        let guard = PartialFile::new(dest);

        let start = std::time::Instant::now();
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await.map_err(|e| write_error(dest, e))?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if let Some(limit) = self.max_bytes {
                if total > limit {
                    tracing::warn!(
                        path = %dest.display(),
                        limit_bytes = limit,
                        "Upload exceeded size limit"
                    );
                    return Err(StorageError::PayloadTooLarge { limit });
                }
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .map_err(|e| write_error(dest, e))?;
        }

        file.flush().await.map_err(|e| write_error(dest, e))?;
        file.sync_all().await.map_err(|e| write_error(dest, e))?;
        drop(file);
        guard.disarm();

        let digest = hex::encode(hasher.finalize());
        tracing::debug!(
            path = %dest.display(),
            size_bytes = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "File persisted"
        );

        Ok(PersistedFile {
            size_bytes: total,
            digest,
        })
    }
}

fn write_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Ensure the parent directory of `path` exists.
pub async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Create `dir` and all missing parents (0755 on unix).
async fn create_dir_all(dir: &Path) -> StorageResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder
        .create(dir)
        .await
        .map_err(|source| StorageError::CreateDirectory {
            path: PathBuf::from(dir),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::tempdir;
    use tokio::io::ReadBuf;

    /// Yields one chunk, then fails like a dropped client connection.
    struct FailingReader {
        sent: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.sent {
                self.sent = true;
                buf.put_slice(b"partial bytes");
                Poll::Ready(Ok(()))
            } else {
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "client went away",
                )))
            }
        }
    }

    #[tokio::test]
    async fn test_persist_creates_parents_and_hashes() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("photos/2024/03/hello.txt");

        let mut reader: &[u8] = b"hello world";
        let persisted = FilePersister::new().persist(&mut reader, &dest).await.unwrap();

        assert_eq!(persisted.size_bytes, 11);
        assert_eq!(
            persisted.digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_digest_matches_bytes_on_disk() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("big.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let mut reader = data.as_slice();
        let persisted = FilePersister::new().persist(&mut reader, &dest).await.unwrap();

        let on_disk = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(persisted.size_bytes, on_disk.len() as u64);
        assert_eq!(persisted.digest, hex::encode(Sha256::digest(&on_disk)));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("empty");
        let mut reader: &[u8] = b"";
        let persisted = FilePersister::new().persist(&mut reader, &dest).await.unwrap();
        assert_eq!(persisted.size_bytes, 0);
        assert_eq!(
            persisted.digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_copy_failure_removes_partial_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("photos/broken.jpg");

        let mut reader = FailingReader { sent: false };
        let err = FilePersister::new()
            .persist(&mut reader, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Write { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a.jpg");
        tokio::fs::write(&dest, b"first").await.unwrap();

        let mut reader: &[u8] = b"second";
        let err = FilePersister::new()
            .persist(&mut reader, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_size_limit_removes_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("too-big.bin");
        let data = vec![7u8; 4096];

        let mut reader = data.as_slice();
        let err = FilePersister::with_max_bytes(1024)
            .persist(&mut reader, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::PayloadTooLarge { limit: 1024 }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_directory_creation_failure_leaves_no_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("photos");
        tokio::fs::write(&blocker, b"not a directory").await.unwrap();
        let dest = blocker.join("2024/03/a.jpg");

        let mut reader: &[u8] = b"data";
        let err = FilePersister::new()
            .persist(&mut reader, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::CreateDirectory { .. }));
        assert!(!dest.exists());
    }
}
