//! Database header: schema version plus record type descriptors.
//!
//! Written once when a cache directory is created and compared on every
//! open, so a cache written by an incompatible build is rejected up front.

use crate::error::{CacheError, Result};
use crate::model::{ElevationIndex, FileIndex, TileIndex};
use crate::registry::{PYRAMID_RECORD_DESCRIPTOR, SURFACE_RECORD_DESCRIPTOR};

/// Version string every compatible cache carries.
pub const DB_VERSION: &str = "Virtual Globe Cache DB 1.01";

const CLOCK_DESCRIPTOR: &str = "clock|20";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: String,
    pub descriptors: Vec<String>,
}

impl Header {
    /// Header describing this build's schema.
    pub fn current() -> Self {
        Self {
            version: DB_VERSION.to_string(),
            descriptors: vec![
                CLOCK_DESCRIPTOR.to_string(),
                SURFACE_RECORD_DESCRIPTOR.to_string(),
                PYRAMID_RECORD_DESCRIPTOR.to_string(),
                TileIndex::descriptor(),
                ElevationIndex::descriptor(),
                FileIndex::descriptor(),
            ],
        }
    }

    /// One line per field: version first, then descriptors.
    pub fn encode(&self) -> Vec<u8> {
        let mut lines = Vec::with_capacity(1 + self.descriptors.len());
        lines.push(self.version.as_str());
        lines.extend(self.descriptors.iter().map(String::as_str));
        lines.join("\n").into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(buf)
            .map_err(|_| CacheError::Corrupt("header is not valid utf-8".into()))?;
        let mut lines = text.split('\n');
        let version = lines.next().unwrap_or_default().to_string();
        Ok(Self {
            version,
            descriptors: lines.map(str::to_string).collect(),
        })
    }

    /// Fails with [`CacheError::VersionMismatch`] unless `found` matches.
    pub fn check(&self, found: &Header) -> Result<()> {
        if self.version != found.version {
            return Err(CacheError::VersionMismatch {
                expected: self.version.clone(),
                found: found.version.clone(),
            });
        }
        if self.descriptors != found.descriptors {
            return Err(CacheError::VersionMismatch {
                expected: self.descriptors.join(", "),
                found: found.descriptors.join(", "),
            });
        }
        Ok(())
    }
}
