//! External codec capability and the HEIC preview converter built on it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{ArchiveConfig, DerivedAsset};
use hearth_storage::{cleanup_files, ensure_parent_dir};

use crate::command::CommandRunner;
use crate::error::ProcessingError;

/// A conversion performed by something outside this process.
///
/// Implementations write `output` from `input` and return the path of the
/// file they produced. A missing or empty output is a failure.
#[async_trait]
pub trait ExternalConverter: Send + Sync {
    fn name(&self) -> &str;

    async fn convert(&self, input: &Path, output: &Path) -> Result<PathBuf, ProcessingError>;
}

async fn verify_output(output: &Path) -> Result<PathBuf, ProcessingError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(output.to_path_buf()),
        _ => Err(ProcessingError::MissingOutput(output.to_path_buf())),
    }
}

/// `heif-convert -q <quality> <input> <output>`
#[derive(Debug, Clone)]
pub struct HeifConverter {
    runner: CommandRunner,
    quality: u8,
}

impl HeifConverter {
    pub fn new(
        program: impl Into<String>,
        quality: u8,
        timeout: Duration,
    ) -> Result<Self, ProcessingError> {
        Ok(Self {
            runner: CommandRunner::new(program, timeout)?,
            quality,
        })
    }

    pub fn from_config(config: &ArchiveConfig) -> Result<Self, ProcessingError> {
        Self::new(
            config.heif_convert_path.clone(),
            config.preview_quality,
            config.subprocess_timeout,
        )
    }
}

#[async_trait]
impl ExternalConverter for HeifConverter {
    fn name(&self) -> &str {
        "heif-convert"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<PathBuf, ProcessingError> {
        let args: Vec<OsString> = vec![
            "-q".into(),
            self.quality.to_string().into(),
            input.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
        ];
        self.runner.run(&args).await?;
        verify_output(output).await
    }
}

/// Extracts one video frame as JPEG with ffmpeg, optionally seeking first.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    runner: CommandRunner,
    seek_seconds: Option<u32>,
}

impl FfmpegFrameExtractor {
    /// Frame at `seek_seconds`, or the first frame when `None`.
    pub fn new(
        program: impl Into<String>,
        seek_seconds: Option<u32>,
        timeout: Duration,
    ) -> Result<Self, ProcessingError> {
        Ok(Self {
            runner: CommandRunner::new(program, timeout)?,
            seek_seconds,
        })
    }

    /// Frame at the 1 second mark.
    pub fn at_one_second(config: &ArchiveConfig) -> Result<Self, ProcessingError> {
        Self::new(config.ffmpeg_path.clone(), Some(1), config.subprocess_timeout)
    }

    /// Very first frame.
    pub fn first_frame(config: &ArchiveConfig) -> Result<Self, ProcessingError> {
        Self::new(config.ffmpeg_path.clone(), None, config.subprocess_timeout)
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into()];
        if let Some(seek) = self.seek_seconds {
            args.push("-ss".into());
            args.push(seek.to_string().into());
        }
        args.extend([
            "-i".into(),
            input.as_os_str().to_owned(),
            "-vframes".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            output.as_os_str().to_owned(),
        ]);
        args
    }
}

#[async_trait]
impl ExternalConverter for FfmpegFrameExtractor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<PathBuf, ProcessingError> {
        self.runner.run(&self.args(input, output)).await?;
        // ffmpeg exits 0 without writing a frame when seeking past the end.
        verify_output(output).await
    }
}

/// Produces the JPEG preview of a HEIC/HEIF original.
#[derive(Clone)]
pub struct FormatConverter {
    converter: Arc<dyn ExternalConverter>,
}

impl FormatConverter {
    pub fn new(converter: Arc<dyn ExternalConverter>) -> Self {
        Self { converter }
    }

    /// Convert `source` into `target`. An existing target is never replaced.
    /// On failure nothing is left at the target path.
    #[tracing::instrument(skip(self, target), fields(
        converter = self.converter.name(),
        target = %target.absolute.display()
    ))]
    pub async fn to_preview(
        &self,
        source: &Path,
        target: DerivedAsset,
    ) -> Result<DerivedAsset, ProcessingError> {
        if tokio::fs::try_exists(&target.absolute).await? {
            return Err(ProcessingError::OutputExists(target.absolute));
        }
        ensure_parent_dir(&target.absolute).await?;

        let start = std::time::Instant::now();
        match self.converter.convert(source, &target.absolute).await {
            Ok(_) => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Preview created"
                );
                Ok(target)
            }
            Err(e) => {
                cleanup_files([&target.absolute]).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingConverter, JpegConverter};
    use hearth_core::DerivedAssetKind;
    use tempfile::tempdir;

    fn preview_target(base: &Path) -> DerivedAsset {
        DerivedAsset::new(
            DerivedAssetKind::Preview,
            base,
            PathBuf::from("photos/2024/03/IMG_1.jpg"),
        )
    }

    #[test]
    fn test_ffmpeg_args() {
        let timeout = Duration::from_secs(60);
        let seek = FfmpegFrameExtractor::new("ffmpeg", Some(1), timeout).unwrap();
        let args = seek.args(Path::new("/m/v.mp4"), Path::new("/m/f.jpg"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-y", "-ss", "1", "-i", "/m/v.mp4", "-vframes", "1", "-q:v", "2", "/m/f.jpg"]
        );

        let first = FfmpegFrameExtractor::new("ffmpeg", None, timeout).unwrap();
        let args = first.args(Path::new("/m/v.mp4"), Path::new("/m/f.jpg"));
        assert!(!args.iter().any(|a| a == "-ss"));
    }

    #[test]
    fn test_converter_rejects_unsafe_program() {
        let config = ArchiveConfig {
            heif_convert_path: "heif-convert && curl evil".to_string(),
            ..ArchiveConfig::default()
        };
        assert!(matches!(
            HeifConverter::from_config(&config),
            Err(ProcessingError::InvalidProgram(_))
        ));
    }

    #[tokio::test]
    async fn test_to_preview_success() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_1.HEIC");
        tokio::fs::write(&source, b"heic bytes").await.unwrap();

        let converter = FormatConverter::new(Arc::new(JpegConverter::new(64, 48)));
        let preview = converter
            .to_preview(&source, preview_target(dir.path()))
            .await
            .unwrap();

        assert!(preview.absolute.exists());
        assert_ne!(preview.absolute, source);
    }

    #[tokio::test]
    async fn test_to_preview_failure_leaves_nothing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_1.HEIC");
        tokio::fs::write(&source, b"heic bytes").await.unwrap();

        let converter = FormatConverter::new(Arc::new(FailingConverter::writing_partial_output()));
        let target = preview_target(dir.path());
        let err = converter
            .to_preview(&source, target.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::CommandFailed { .. }));
        assert!(!target.absolute.exists());
    }

    #[tokio::test]
    async fn test_to_preview_never_overwrites() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_1.HEIC");
        let target = preview_target(dir.path());
        tokio::fs::create_dir_all(target.absolute.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&target.absolute, b"someone else's jpeg")
            .await
            .unwrap();

        let converter = FormatConverter::new(Arc::new(JpegConverter::new(8, 8)));
        let err = converter
            .to_preview(&source, target.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::OutputExists(_)));
        assert_eq!(
            tokio::fs::read(&target.absolute).await.unwrap(),
            b"someone else's jpeg"
        );
    }
}
