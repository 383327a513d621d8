pub mod orientation;
pub mod thumbnail;

pub use orientation::ImageOrientation;
pub use thumbnail::ThumbnailGenerator;

use std::path::Path;

use hearth_storage::ensure_parent_dir;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use tokio::io::AsyncWriteExt;

use crate::error::ProcessingError;

/// Decode an image from disk with its EXIF orientation applied.
pub(crate) fn open_oriented(path: &Path) -> Result<DynamicImage, ProcessingError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let orientation = ImageOrientation::read_exif_orientation(path);
    Ok(ImageOrientation::apply(img, orientation))
}

/// Largest size fitting within `max`x`max` with the same aspect ratio.
/// Images that already fit are returned unchanged, never upscaled.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = f64::min(max as f64 / width as f64, max as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max);
    (w, h)
}

pub(crate) fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ProcessingError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buf)
}

/// Write `bytes` to a file that must not exist yet. A failed write removes
/// the partial file.
pub(crate) async fn write_new(path: &Path, bytes: &[u8]) -> Result<(), ProcessingError> {
    ensure_parent_dir(path).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => ProcessingError::OutputExists(path.to_path_buf()),
            _ => ProcessingError::Io(e),
        })?;

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        hearth_storage::cleanup_files([path]).await;
        return Err(e.into());
    }
    Ok(())
}
