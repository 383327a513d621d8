use std::path::Path;

use hearth_core::{AppError, ErrorMetadata, ErrorResponse, LogLevel};
use tracing_subscriber::EnvFilter;

/// Initialize tracing for the CLI. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hearth=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Render a failed command for stderr. Application errors become an
/// `ErrorResponse` document; anything else prints as its error chain.
pub fn render_error(err: &anyhow::Error, is_production: bool) -> String {
    match err.downcast_ref::<AppError>() {
        Some(app) => {
            let response = ErrorResponse::from_error(app, is_production);
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| format!("Error: {:#}", err))
        }
        None => format!("Error: {:#}", err),
    }
}

/// Log a failed command at the level its error asks for.
pub fn log_error(err: &anyhow::Error) {
    let chain = format!("{:#}", err);
    let Some(app) = err.downcast_ref::<AppError>() else {
        tracing::error!(error = %chain, "Command failed");
        return;
    };
    let error_type = app.error_type();
    let code = app.error_code();
    match app.log_level() {
        LogLevel::Debug => tracing::debug!(error_type, code, error = %chain, "Command failed"),
        LogLevel::Warn => tracing::warn!(error_type, code, error = %chain, "Command failed"),
        LogLevel::Error => tracing::error!(error_type, code, error = %chain, "Command failed"),
    }
}

/// MIME type for common camera and phone file extensions.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "3gp" => "video/3gpp",
        _ => "application/octet-stream",
    }
}
