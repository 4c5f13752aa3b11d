//! # DataFile - Record Store Checkpoint
//!
//! Immutable snapshot of the whole record store, stored as `cache.db`. The
//! store rewrites it from its in-memory table whenever the mutation log
//! (`cache.lg`) grows past the checkpoint threshold, and on close.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER   magic (u32 LE) "VGD1" | format_version (u16 LE)        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DATA     repeated, ascending key order:                        │
//! │          crc32 (u32) | key_len (u32) | key | val_len (u32) | val │
//! │                                                               │
//! │          The CRC32 covers key_len through the end of the value. │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER   entry_count (u64 LE) | magic (u32 LE) "VGD1"           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The file is written to `<path>.tmp`, fsynced and renamed into place, so a
//! reader sees either the previous checkpoint or the new one, never a mix.

mod format;
mod reader;
mod writer;

pub use format::{DATAFILE_MAGIC, FOOTER_BYTES, FORMAT_VERSION, HEADER_BYTES};
pub use reader::DataFileReader;
pub use writer::DataFileWriter;

use std::io;
use thiserror::Error;

/// Errors raised while reading or writing a data file.
#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Bad magic, unknown version, CRC mismatch or a count that does not
    /// match the footer.
    #[error("corrupt data file: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests;
