//! Filesystem side of the archive: where originals and derived assets live,
//! how bytes get there, and how they are removed again.
//!
//! Layout under the media root:
//!
//! ```text
//! {base}/{photos|videos}/{YYYY}/{MM}/{file}
//! {base}/{photos|videos}/{YYYY}/{MM}/{stem}.jpg        HEIC preview
//! {base}/{photos|videos}/{YYYY}/{MM}/{stem}.web.webp   web copy
//! {base}/.thumbs/{photos|videos}/{YYYY}/{MM}/{stem}.jpg
//! ```

pub mod cleanup;
pub mod error;
pub mod locator;
pub mod persister;

pub use cleanup::{cleanup_files, cleanup_files_blocking, PendingFiles};
pub use error::{StorageError, StorageResult};
pub use locator::{sanitize_filename, StorageLocator};
pub use persister::{ensure_parent_dir, FilePersister, PersistedFile};
