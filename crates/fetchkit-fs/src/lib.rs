//! Filesystem helpers for persisting HTTP payloads.
//!
//! Everything here is synchronous and operates on whole buffers:
//! - [`ready_directory`] makes sure a target directory exists with a mode
//! - [`put`] writes a buffer either atomically (temp + rename) or under an
//!   exclusive advisory lock
//! - [`stream_extension`] / [`stream_mime_type`] sniff content by magic bytes

mod error;
mod sniff;
mod write;

pub use error::{Error, Result};
pub use sniff::{mime_type, stream_extension, stream_mime_type};
pub use write::{atomic_write, put, read, ready_directory};

use std::path::Path;

pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}
