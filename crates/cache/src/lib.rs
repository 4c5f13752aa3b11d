//! # Cache - Persistent Tile, Elevation and File Cache
//!
//! The orchestrator that ties [`store`], [`index`] and [`codec`] together
//! into a self-managing on-disk cache for a globe viewer's terrain and asset
//! streaming.
//!
//! ## Architecture
//!
//! ```text
//! Viewer threads
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                   CACHE MANAGER                      │
//! │                                                      │
//! │ tiles.rs     → pyramid registry → tile gate → TileSet│
//! │ elevation.rs → surface registry → per-surface index  │
//! │ files.rs     → FileSet → conditional fetch → Files/  │
//! │                   |                                  │
//! │                   v                                  │
//! │        clock (tick, cutoff, file ids, size)          │
//! │                   |                                  │
//! │        record store (cache.db + cache.lg)            │
//! │                                                      │
//! │ gc/tile.rs      → histogram → new cutoff             │
//! │ gc/elevation.rs → cutoff → stale samples, retired    │
//! │                   surfaces                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                              |
//! |-----------------|------------------------------------------------------|
//! | [`manager`]     | `CacheManager`: open/close/commit/delete/recreate, stats |
//! | [`state`]       | roots of one open directory and their commit         |
//! | [`tiles`]       | `tile_cache_file()`                                  |
//! | [`elevation`]   | `ElevationCache` handles and surface binding         |
//! | [`files`]       | `input_stream()`, `delete_file()`                    |
//! | [`gc`]          | Tile GC and Elevation GC daemons                     |
//! | [`histogram`]   | `TsSize` size/age histogram                          |
//! | [`clock`]       | logical clock record                                 |
//! | [`registry`]    | pyramid and surface registries                       |
//! | [`layout`]      | directory layout and file removal helpers            |
//! | [`fetch`]       | `Fetcher` trait and the HTTP implementation          |
//!
//! ## Recency
//!
//! Every touch stamps the entry with the current tick of the logical
//! clock. The Tile GC turns the size budget into a cutoff tick; everything
//! stamped below it is evicted by the next pass of either collector.
//!
//! ## Failure Policy
//!
//! Only [`CacheManager::open`] and [`CacheManager::commit`] return errors.
//! Everything else logs, counts corruption toward an automatic rebuild, and
//! degrades to a cache miss.

mod clock;
mod elevation;
mod error;
mod fetch;
mod files;
mod gc;
mod header;
mod histogram;
mod layout;
mod manager;
mod model;
mod registry;
mod state;
mod surface_cache;
mod tile_gate;
mod tiles;

pub use clock::{Clock, INITIAL_CUTOFF, INITIAL_FILE_ID, INITIAL_TICK};
pub use codec::ElevationRecord;
pub use config::CacheConfig;
pub use elevation::ElevationCache;
pub use error::{CacheError, Result};
pub use fetch::{http_date, FetchError, FetchOutcome, Fetcher, HttpFetcher};
pub use files::InputStream;
pub use header::{Header, DB_VERSION};
pub use histogram::TsSize;
pub use layout::{CacheLayout, DELETE_SENTINEL, FILES_DIR, TILES_DIR};
pub use manager::CacheManager;
pub use model::{
    CacheStats, DeleteOutcome, ElevationIndex, ElevationPassReport, FileIndex, GcReport,
    ModelParams, TileIndex, TilePassReport,
};
pub use registry::{PyramidRegistry, SurfaceEntry, SurfaceRecord, SurfaceRegistry};

#[cfg(test)]
mod tests;
