//! Catalog repositories.
//!
//! [`MediaRecordStore`] is the seam the services depend on. The Postgres
//! implementation backs the binaries; the in-memory one backs tests and
//! local runs without a database.

pub mod media;
pub mod memory;

pub use media::{MediaCursor, MediaRecordStore, PgMediaRecordStore};
pub use memory::InMemoryMediaStore;
