//! Configuration module
//!
//! `ArchiveConfig` is loaded once at startup and passed explicitly into every
//! component that needs it. Nothing below the binary reads the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const MEDIA_PATH: &str = "/mnt/storage/media";
const MAX_UPLOAD_SIZE_MB: u64 = 100;
const SUBPROCESS_TIMEOUT_SECS: u64 = 60;
const THUMBNAIL_SIZE: u32 = 300;
const THUMBNAIL_QUALITY: u8 = 80;
const PREVIEW_QUALITY: u8 = 85;
const WEB_QUALITY: u8 = 80;
const WEB_MAX_DIMENSION: u32 = 2048;
/// Largest edge the WebP encoder accepts.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Media archive configuration
#[derive(Clone, Debug)]
pub struct ArchiveConfig {
    pub media_path: PathBuf,
    pub database_url: Option<String>,
    pub max_upload_bytes: u64,
    // External converters
    pub heif_convert_path: String,
    pub ffmpeg_path: String,
    pub subprocess_timeout: Duration,
    // Derived assets
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    pub preview_quality: u8,
    pub web_quality: u8,
    pub web_max_dimension: u32,
    pub environment: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            media_path: PathBuf::from(MEDIA_PATH),
            database_url: None,
            max_upload_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            heif_convert_path: "heif-convert".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            subprocess_timeout: Duration::from_secs(SUBPROCESS_TIMEOUT_SECS),
            thumbnail_size: THUMBNAIL_SIZE,
            thumbnail_quality: THUMBNAIL_QUALITY,
            preview_quality: PREVIEW_QUALITY,
            web_quality: WEB_QUALITY,
            web_max_dimension: WEB_MAX_DIMENSION,
            environment: "development".to_string(),
        }
    }
}

impl ArchiveConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let max_upload_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            anyhow::anyhow!("MAX_UPLOAD_SIZE_MB is too large: {}", max_upload_mb)
        })?;

        let timeout_secs = env::var("SUBPROCESS_TIMEOUT_SECS")
            .unwrap_or_else(|_| SUBPROCESS_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .unwrap_or(SUBPROCESS_TIMEOUT_SECS);

        let config = ArchiveConfig {
            media_path: env::var("MEDIA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(MEDIA_PATH)),
            database_url: env::var("DATABASE_URL").ok(),
            max_upload_bytes,
            heif_convert_path: env::var("HEIF_CONVERT_PATH")
                .unwrap_or_else(|_| "heif-convert".to_string()),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            subprocess_timeout: Duration::from_secs(timeout_secs),
            thumbnail_size: env::var("THUMBNAIL_SIZE")
                .unwrap_or_else(|_| THUMBNAIL_SIZE.to_string())
                .parse()
                .unwrap_or(THUMBNAIL_SIZE),
            thumbnail_quality: env::var("THUMBNAIL_QUALITY")
                .unwrap_or_else(|_| THUMBNAIL_QUALITY.to_string())
                .parse()
                .unwrap_or(THUMBNAIL_QUALITY),
            preview_quality: env::var("PREVIEW_QUALITY")
                .unwrap_or_else(|_| PREVIEW_QUALITY.to_string())
                .parse()
                .unwrap_or(PREVIEW_QUALITY),
            web_quality: env::var("WEB_QUALITY")
                .unwrap_or_else(|_| WEB_QUALITY.to_string())
                .parse()
                .unwrap_or(WEB_QUALITY),
            web_max_dimension: env::var("WEB_MAX_DIMENSION")
                .unwrap_or_else(|_| WEB_MAX_DIMENSION.to_string())
                .parse()
                .unwrap_or(WEB_MAX_DIMENSION),
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at `media_path` with every other value defaulted.
    pub fn with_media_path(media_path: impl Into<PathBuf>) -> Self {
        Self {
            media_path: media_path.into(),
            ..Self::default()
        }
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.media_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("MEDIA_PATH cannot be empty"));
        }
        if self.is_production() && self.media_path.is_relative() {
            return Err(anyhow::anyhow!(
                "MEDIA_PATH must be an absolute path in production"
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }
        if self.subprocess_timeout.is_zero() {
            return Err(anyhow::anyhow!(
                "SUBPROCESS_TIMEOUT_SECS must be greater than 0"
            ));
        }
        if self.thumbnail_size == 0 || self.web_max_dimension == 0 {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_SIZE and WEB_MAX_DIMENSION must be greater than 0"
            ));
        }
        if self.web_max_dimension > WEBP_MAX_DIMENSION {
            return Err(anyhow::anyhow!(
                "WEB_MAX_DIMENSION must be at most {}",
                WEBP_MAX_DIMENSION
            ));
        }
        for (name, quality) in [
            ("THUMBNAIL_QUALITY", self.thumbnail_quality),
            ("PREVIEW_QUALITY", self.preview_quality),
            ("WEB_QUALITY", self.web_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(anyhow::anyhow!("{} must be between 1 and 100", name));
            }
        }
        Ok(())
    }
}
