use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Tag};
use image::DynamicImage;

/// Image orientation operations (rotation and flipping)
pub struct ImageOrientation;

impl ImageOrientation {
    /// Read the EXIF orientation tag of the file at `path`.
    ///
    /// Returns 1 (normal) when the file has no EXIF block, no orientation
    /// tag, or a value outside 1–8.
    pub fn read_exif_orientation(path: &Path) -> u16 {
        let Ok(file) = File::open(path) else {
            return 1;
        };
        let mut reader = BufReader::new(file);
        let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
            return 1;
        };
        exif.get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| (1..=8).contains(v))
            .unwrap_or(1)
    }

    /// Rotation and flips that bring an image with the given orientation upright.
    /// Returns (rotate_angle_clockwise, flip_horizontal, flip_vertical); rotation
    /// is applied first.
    pub fn transforms(orientation: u16) -> (Option<u16>, bool, bool) {
        match orientation {
            1 => (None, false, false),      // Normal
            2 => (None, true, false),       // Mirror horizontal
            3 => (Some(180), false, false), // Rotate 180
            4 => (None, false, true),       // Mirror vertical
            5 => (Some(90), true, false),   // Transpose
            6 => (Some(90), false, false),  // Rotate 90 CW
            7 => (Some(270), true, false),  // Transverse
            8 => (Some(270), false, false), // Rotate 270 CW
            _ => (None, false, false),
        }
    }

    /// Apply an EXIF orientation to a decoded image
    pub fn apply(mut img: DynamicImage, orientation: u16) -> DynamicImage {
        let (rotate, flip_h, flip_v) = Self::transforms(orientation);
        if orientation != 1 {
            tracing::debug!(
                orientation = orientation,
                rotate = ?rotate,
                flip_horizontal = flip_h,
                flip_vertical = flip_v,
                "Applying EXIF orientation"
            );
        }

        if let Some(angle) = rotate {
            img = Self::rotate_by_angle(img, angle);
        }
        if flip_h {
            img = img.fliph();
        }
        if flip_v {
            img = img.flipv();
        }
        img
    }

    /// Rotate image by 90, 180 or 270 degrees clockwise
    pub fn rotate_by_angle(img: DynamicImage, angle: u16) -> DynamicImage {
        match angle {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        }
    }
}
