//! Fixtures and converter doubles for tests. No real codec binaries needed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::ExtractedMetadata;
use hearth_storage::{FilePersister, StorageLocator};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

use crate::compression::WebOptimizer;
use crate::converter::{ExternalConverter, FormatConverter};
use crate::error::ProcessingError;
use crate::image::ThumbnailGenerator;
use crate::metadata::{ExifMetadataExtractor, MetadataExtractor};
use crate::upload::IngestionOrchestrator;

/// Encode a gradient JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(encoder)
        .expect("encode test jpeg");
    buf
}

/// A JPEG whose first segment after SOI is the given EXIF block.
pub fn jpeg_with_exif(width: u32, height: u32, exif: &ExifBuilder) -> Vec<u8> {
    let jpeg = jpeg_bytes(width, height);
    let mut out = Vec::with_capacity(jpeg.len() + 512);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&exif.build_app1());
    out.extend_from_slice(&jpeg[2..]);
    out
}

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            kind: TYPE_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            kind: TYPE_SHORT,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: TYPE_LONG,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn rationals(tag: u16, values: &[(u32, u32)]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for (num, denom) in values {
            data.extend_from_slice(&num.to_le_bytes());
            data.extend_from_slice(&denom.to_le_bytes());
        }
        Self {
            tag,
            kind: TYPE_RATIONAL,
            count: values.len() as u32,
            data,
        }
    }
}

fn out_of_line_len(entry: &Entry) -> usize {
    if entry.data.len() > 4 {
        entry.data.len() + (entry.data.len() & 1)
    } else {
        0
    }
}

fn ifd_len(entries: &[Entry]) -> usize {
    2 + 12 * entries.len() + 4 + entries.iter().map(out_of_line_len).sum::<usize>()
}

fn write_ifd(out: &mut Vec<u8>, entries: &[Entry]) {
    let start = out.len();
    let mut data_offset = start + 2 + 12 * entries.len() + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.kind.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(data_offset as u32).to_le_bytes());
            data.extend_from_slice(&entry.data);
            if entry.data.len() % 2 == 1 {
                data.push(0);
            }
            data_offset += out_of_line_len(entry);
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&data);
}

/// Hand-assembles a little-endian TIFF/EXIF block.
#[derive(Debug, Clone, Default)]
pub struct ExifBuilder {
    ifd0: Vec<Entry>,
    exif: Vec<Entry>,
    gps: Vec<Entry>,
}

impl ExifBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make(mut self, make: &str) -> Self {
        self.ifd0.push(Entry::ascii(0x010F, make));
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.ifd0.push(Entry::ascii(0x0110, model));
        self
    }

    pub fn orientation(mut self, orientation: u16) -> Self {
        self.ifd0.push(Entry::short(0x0112, orientation));
        self
    }

    pub fn exposure_time(mut self, num: u32, denom: u32) -> Self {
        self.exif.push(Entry::rationals(0x829A, &[(num, denom)]));
        self
    }

    pub fn f_number(mut self, num: u32, denom: u32) -> Self {
        self.exif.push(Entry::rationals(0x829D, &[(num, denom)]));
        self
    }

    pub fn iso(mut self, iso: u16) -> Self {
        self.exif.push(Entry::short(0x8827, iso));
        self
    }

    /// `YYYY:MM:DD HH:MM:SS`
    pub fn date_time_original(mut self, value: &str) -> Self {
        self.exif.push(Entry::ascii(0x9003, value));
        self
    }

    /// `+HH:MM`
    pub fn offset_time_original(mut self, value: &str) -> Self {
        self.exif.push(Entry::ascii(0x9011, value));
        self
    }

    pub fn focal_length(mut self, num: u32, denom: u32) -> Self {
        self.exif.push(Entry::rationals(0x920A, &[(num, denom)]));
        self
    }

    pub fn pixel_dimensions(mut self, width: u32, height: u32) -> Self {
        self.exif.push(Entry::long(0xA002, width));
        self.exif.push(Entry::long(0xA003, height));
        self
    }

    /// Latitude and longitude as (ref, [deg, min, sec] rationals).
    pub fn gps(
        mut self,
        lat_ref: &str,
        lat: [(u32, u32); 3],
        lon_ref: &str,
        lon: [(u32, u32); 3],
    ) -> Self {
        self.gps.push(Entry::ascii(0x0001, lat_ref));
        self.gps.push(Entry::rationals(0x0002, &lat));
        self.gps.push(Entry::ascii(0x0003, lon_ref));
        self.gps.push(Entry::rationals(0x0004, &lon));
        self
    }

    pub fn build_tiff(&self) -> Vec<u8> {
        let mut ifd0 = self.ifd0.clone();
        let mut exif = self.exif.clone();
        let mut gps = self.gps.clone();
        exif.sort_by_key(|e| e.tag);
        gps.sort_by_key(|e| e.tag);

        // Pointer entries are inline LONGs, so sizes are known before offsets.
        if !exif.is_empty() {
            ifd0.push(Entry::long(0x8769, 0));
        }
        if !gps.is_empty() {
            ifd0.push(Entry::long(0x8825, 0));
        }
        let exif_offset = 8 + ifd_len(&ifd0);
        let gps_offset = exif_offset + if exif.is_empty() { 0 } else { ifd_len(&exif) };
        for entry in ifd0.iter_mut() {
            match entry.tag {
                0x8769 => entry.data = (exif_offset as u32).to_le_bytes().to_vec(),
                0x8825 => entry.data = (gps_offset as u32).to_le_bytes().to_vec(),
                _ => {}
            }
        }
        ifd0.sort_by_key(|e| e.tag);

        let mut out = vec![b'I', b'I', 0x2A, 0x00, 8, 0, 0, 0];
        write_ifd(&mut out, &ifd0);
        if !exif.is_empty() {
            write_ifd(&mut out, &exif);
        }
        if !gps.is_empty() {
            write_ifd(&mut out, &gps);
        }
        out
    }

    /// JPEG APP1 segment carrying the TIFF block.
    pub fn build_app1(&self) -> Vec<u8> {
        let tiff = self.build_tiff();
        let len = (2 + 6 + tiff.len()) as u16;
        let mut out = vec![0xFF, 0xE1];
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out
    }
}

/// Writes a real JPEG of a fixed size to the output path.
#[derive(Debug, Default)]
pub struct JpegConverter {
    width: u32,
    height: u32,
    exif: Option<ExifBuilder>,
    calls: AtomicUsize,
}

impl JpegConverter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            exif: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Embed `exif` in every JPEG written.
    pub fn with_exif(mut self, exif: ExifBuilder) -> Self {
        self.exif = Some(exif);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalConverter for JpegConverter {
    fn name(&self) -> &str {
        "jpeg-stub"
    }

    async fn convert(&self, _input: &Path, output: &Path) -> Result<PathBuf, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = match &self.exif {
            Some(exif) => jpeg_with_exif(self.width, self.height, exif),
            None => jpeg_bytes(self.width, self.height),
        };
        tokio::fs::write(output, bytes).await?;
        Ok(output.to_path_buf())
    }
}

/// Always fails like a codec exiting non-zero.
#[derive(Debug, Default)]
pub struct FailingConverter {
    partial_output: bool,
    calls: AtomicUsize,
}

impl FailingConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves garbage at the output path before failing.
    pub fn writing_partial_output() -> Self {
        Self {
            partial_output: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalConverter for FailingConverter {
    fn name(&self) -> &str {
        "failing-stub"
    }

    async fn convert(&self, _input: &Path, output: &Path) -> Result<PathBuf, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.partial_output {
            tokio::fs::write(output, b"\xFF\xD8truncated").await?;
        }
        Err(ProcessingError::CommandFailed {
            program: "failing-stub".to_string(),
            status: "exit status: 1".to_string(),
            output: "Output file is empty, nothing was encoded".to_string(),
        })
    }
}

/// Shared handles to converter doubles, for asserting call counts after the
/// converters have been moved into a component.
pub fn shared<T: ExternalConverter + 'static>(converter: T) -> (Arc<T>, Arc<dyn ExternalConverter>) {
    let concrete = Arc::new(converter);
    let erased: Arc<dyn ExternalConverter> = concrete.clone();
    (concrete, erased)
}

/// Metadata extractor that always fails.
#[derive(Debug, Default)]
pub struct FailingMetadataExtractor;

#[async_trait]
impl MetadataExtractor for FailingMetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ProcessingError> {
        Err(ProcessingError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("cannot read {}", path.display()),
        )))
    }
}

/// Orchestrator rooted at `base` with real EXIF and image code, and stubs
/// writing real JPEGs in place of `heif-convert` and `ffmpeg`.
pub fn stub_orchestrator(base: &Path) -> IngestionOrchestrator {
    IngestionOrchestrator::new(
        StorageLocator::new(base),
        FilePersister::new(),
        Arc::new(ExifMetadataExtractor),
        FormatConverter::new(Arc::new(JpegConverter::new(400, 300))),
        ThumbnailGenerator::new(
            300,
            80,
            Arc::new(JpegConverter::new(640, 360)),
            Arc::new(JpegConverter::new(640, 360)),
        ),
        WebOptimizer::new(80, 2048),
    )
}
