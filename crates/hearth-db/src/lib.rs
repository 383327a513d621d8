//! Catalog persistence for archived media.

pub mod db;

pub use db::{InMemoryMediaStore, MediaCursor, MediaRecordStore, PgMediaRecordStore};
