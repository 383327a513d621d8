//! EXIF metadata extraction.
//!
//! A missing or malformed EXIF block is not an error: the extractor returns
//! an empty [`ExtractedMetadata`]. Each field is read on its own, so one
//! malformed tag never hides the others.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use exif::{Exif, Field, In, Rational, Tag, Value};
use hearth_core::{ExtractedMetadata, GpsCoordinates};

use crate::error::ProcessingError;

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ProcessingError>;
}

/// Reads EXIF with `kamadak-exif` on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct ExifMetadataExtractor;

#[async_trait]
impl MetadataExtractor for ExifMetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ProcessingError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_from_file(&path)).await?
    }
}

/// Only failing to open the file is an error.
pub fn extract_from_file(path: &Path) -> Result<ExtractedMetadata, ProcessingError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(from_exif(&exif)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No readable EXIF block");
            Ok(ExtractedMetadata::default())
        }
    }
}

fn from_exif(exif: &Exif) -> ExtractedMetadata {
    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY);

    ExtractedMetadata {
        width: field(Tag::PixelXDimension)
            .and_then(uint)
            .or_else(|| field(Tag::ImageWidth).and_then(uint)),
        height: field(Tag::PixelYDimension)
            .and_then(uint)
            .or_else(|| field(Tag::ImageLength).and_then(uint)),
        captured_at: captured_at(exif),
        camera_make: field(Tag::Make).and_then(ascii),
        camera_model: field(Tag::Model).and_then(ascii),
        location: gps_location(exif),
        orientation: field(Tag::Orientation)
            .and_then(uint)
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| (1..=8).contains(v)),
        iso: field(Tag::PhotographicSensitivity).and_then(uint),
        f_number: field(Tag::FNumber).and_then(rational).map(|r| r.to_f64()),
        exposure_time: field(Tag::ExposureTime)
            .and_then(rational)
            .map(format_exposure),
        focal_length: field(Tag::FocalLength).and_then(rational).map(|r| r.to_f64()),
    }
}

fn uint(field: &Field) -> Option<u32> {
    field.value.get_uint(0)
}

/// First string of an ASCII field, trimmed of padding, quotes and NULs.
fn ascii(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|v| String::from_utf8_lossy(v).to_string())
            .map(|s| s.trim_matches(|c: char| c == ' ' || c == '"' || c == '\0').to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// First rational of a field. A zero denominator means the value is absent.
fn rational(field: &Field) -> Option<Rational> {
    match &field.value {
        Value::Rational(values) => values.first().copied().filter(|r| r.denom != 0),
        _ => None,
    }
}

/// `"n"` when the denominator is 1, otherwise `"n/d"`.
pub fn format_exposure(r: Rational) -> String {
    if r.denom == 1 {
        r.num.to_string()
    } else {
        format!("{}/{}", r.num, r.denom)
    }
}

fn captured_at(exif: &Exif) -> Option<DateTime<Utc>> {
    let (value, offset) = [
        (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
        (Tag::DateTime, Tag::OffsetTime),
    ]
    .into_iter()
    .find_map(|(tag, offset_tag)| {
        exif.get_field(tag, In::PRIMARY)
            .map(|f| (f, exif.get_field(offset_tag, In::PRIMARY)))
    })?;

    let Value::Ascii(ref raw) = value.value else {
        return None;
    };
    let mut dt = exif::DateTime::from_ascii(raw.first()?).ok()?;
    if let Some(Value::Ascii(offset_raw)) = offset.map(|f| &f.value) {
        if let Some(first) = offset_raw.first() {
            // Ignore a malformed offset and fall back to UTC.
            let _ = dt.parse_offset(first);
        }
    }

    let naive = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
    match dt.offset {
        Some(minutes) => FixedOffset::east_opt(minutes as i32 * 60)?
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc)),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

fn gps_location(exif: &Exif) -> Option<GpsCoordinates> {
    let latitude = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S', 90.0)?;
    let longitude = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W', 180.0)?;
    Some(GpsCoordinates {
        latitude,
        longitude,
    })
}

/// Degrees/minutes/seconds to signed decimal degrees.
fn gps_coordinate(
    exif: &Exif,
    value_tag: Tag,
    ref_tag: Tag,
    negative_ref: char,
    limit: f64,
) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(ref dms) = field.value else {
        return None;
    };
    if dms.len() < 3 || dms.iter().take(3).any(|r| r.denom == 0) {
        return None;
    }
    let decimal = dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0;
    if !decimal.is_finite() || decimal > limit {
        return None;
    }

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(ascii)
        .map(|r| r.to_ascii_uppercase().starts_with(negative_ref))
        .unwrap_or(false);
    Some(if negative { -decimal } else { decimal })
}
