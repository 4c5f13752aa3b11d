use std::io;

use codec::CodecError;
use index::IndexError;
use store::StoreError;
use thiserror::Error;

use crate::fetch::FetchError;

/// Errors raised inside the cache engine.
///
/// Only [`crate::CacheManager::open`] hands these to callers; every other
/// public operation reports them through logging and the bad-entry counter
/// and returns an empty result instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The on-disk schema was written by a different version.
    #[error("bad database version: expected {expected:?}, found {found:?}")]
    VersionMismatch { expected: String, found: String },

    /// A named root or record is missing or malformed.
    #[error("corrupt cache record: {0}")]
    Corrupt(String),

    #[error("cache manager is closed")]
    Closed,

    /// Every pyramid id is taken.
    #[error("tile pyramid id space exhausted")]
    IdSpaceExhausted,
}

impl CacheError {
    /// Whether this error counts toward the bad-entry threshold.
    pub fn is_corruption(&self) -> bool {
        match self {
            CacheError::Store(StoreError::Corrupt(_)) => true,
            CacheError::Index(e) => e.is_corruption(),
            CacheError::Codec(_) | CacheError::Corrupt(_) => true,
            CacheError::Io(_)
            | CacheError::Store(_)
            | CacheError::Fetch(_)
            | CacheError::VersionMismatch { .. }
            | CacheError::Closed
            | CacheError::IdSpaceExhausted => false,
        }
    }

    /// Whether an `open` that failed with this error should leave the
    /// directory to be deleted and rebuilt by the next `open`.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, CacheError::VersionMismatch { .. }) || self.is_corruption()
    }

    /// Whether this error only reflects a shutdown race.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            CacheError::Closed
                | CacheError::Store(StoreError::Closed)
                | CacheError::Index(IndexError::Store(StoreError::Closed))
        )
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
