//! Shared types: index aliases, named roots, model parameters, reports.

use codec::{ByteOrder, ElevationRecord, FileRecord, SizeFirst};
use index::{BTreeIndex, HTreeIndex};

/// Composite tile key → last-access tick.
pub type TileIndex = BTreeIndex<ByteOrder, i32>;
/// Spatial key → elevation sample, one per surface.
pub type ElevationIndex = BTreeIndex<SizeFirst, ElevationRecord>;
/// URL → backing file id and last-access tick.
pub type FileIndex = HTreeIndex<FileRecord>;

pub(crate) const HEADER_NAME: &str = "Header";
pub(crate) const TS_NAME: &str = "Ts";
pub(crate) const ELEVATION_SURFACE_SET_NAME: &str = "ElevationSurfaceSet";
pub(crate) const TILE_PYRAMID_SET_NAME: &str = "TilePyramidSet";
pub(crate) const FILE_SET_NAME: &str = "FileSet";
pub(crate) const TILE_SET_NAME: &str = "TileSet";

/// Parameters of the elevation model a surface was cached from.
///
/// Only `version` decides staleness; the rest is kept so callers can compare
/// a cached surface against what a server reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    /// Ellipsoid semi-major axis.
    pub ellipsoid_a: f64,
    /// Ellipsoid flattening.
    pub ellipsoid_f: f64,
    pub height_scale: f32,
    pub version: i32,
    pub model_type: i32,
}

impl ModelParams {
    pub fn new(version: i32) -> Self {
        Self {
            ellipsoid_a: 6_378_137.0,
            ellipsoid_f: 1.0 / 298.257_223_563,
            height_scale: 1.0,
            version,
            model_type: 0,
        }
    }
}

/// Outcome of [`crate::CacheManager::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Every store file and content directory was moved aside.
    Removed,
    /// Something could not be renamed; the next open retries.
    Deferred,
}

/// Snapshot returned by [`crate::CacheManager::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub tick: i32,
    pub gc_cutoff: i32,
    pub total_size: u64,
    pub tiles: usize,
    pub files: usize,
    pub pyramids: usize,
    pub surfaces: usize,
    pub pending_deletions: usize,
    pub bad_entries: u32,
    pub store_bytes: u64,
}

/// Result of one Tile GC pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TilePassReport {
    /// Index entries removed because their tick was below the cutoff.
    pub tiles_evicted: usize,
    /// Tile files deleted because no index entry referenced them.
    pub orphans_removed: usize,
    pub files_evicted: usize,
    /// Resident bytes measured by this pass.
    pub total_size: u64,
    /// Cutoff in force after this pass.
    pub cutoff: i32,
}

/// Result of one Elevation GC pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElevationPassReport {
    /// Retired surface indexes fully reclaimed.
    pub indexes_drained: usize,
    pub samples_evicted: usize,
    /// Surfaces dropped because they were empty and stale.
    pub surfaces_dropped: usize,
    /// The sweep was skipped: under budget and the cutoff did not move.
    pub idle: bool,
}

/// Result of [`crate::CacheManager::run_gc_pass`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub tiles: TilePassReport,
    pub elevations: ElevationPassReport,
}
