mod service;

pub use service::{DownloadTarget, MediaLibraryService};
