//! Everything that exists only while a cache directory is open.
//!
//! An [`OpenState`] is built by `open`, shared (`Arc`) by foreground calls
//! and both collectors, and dropped by `close`. Holders that outlive the
//! close find the store closed and fail quietly.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use store::{RecId, RecordStore};
use tracing::debug;

use index::{HashIndex, OrderedIndex};

use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::header::Header;
use crate::layout::CacheLayout;
use crate::model::{
    ElevationIndex, FileIndex, TileIndex, ELEVATION_SURFACE_SET_NAME, FILE_SET_NAME, HEADER_NAME,
    TILE_PYRAMID_SET_NAME, TILE_SET_NAME, TS_NAME,
};
use crate::registry::{PyramidRegistry, SurfaceRegistry};
use crate::surface_cache::SurfaceIndexCache;
use crate::tile_gate::TileGate;

pub(crate) struct OpenState {
    pub layout: CacheLayout,
    pub store: Arc<RecordStore>,
    pub clock: Clock,
    clock_recid: RecId,
    pub pyramids: Mutex<PyramidRegistry>,
    pyramids_recid: RecId,
    pub pyramids_dirty: AtomicBool,
    pub surfaces: Mutex<SurfaceRegistry>,
    surfaces_recid: RecId,
    pub surfaces_dirty: AtomicBool,
    pub surface_indexes: Mutex<SurfaceIndexCache>,
    pub tile_index: TileIndex,
    pub tile_gate: TileGate,
    pub file_index: FileIndex,
    /// Serializes lookup-then-update sequences on the file index.
    pub file_lock: Mutex<()>,
}

/// Fetches the record behind a named root.
fn named_record(store: &RecordStore, name: &str) -> Result<Option<(RecId, Vec<u8>)>> {
    let Some(recid) = store.named_object(name)? else {
        return Ok(None);
    };
    let blob = store
        .fetch_record(recid)?
        .ok_or_else(|| CacheError::Corrupt(format!("root {name} points at missing record {recid}")))?;
    Ok(Some((recid, blob)))
}

/// Stores `blob` as a new record and names it.
fn create_named(store: &RecordStore, name: &str, blob: &[u8]) -> Result<RecId> {
    let recid = store.insert_record(blob)?;
    store.set_named_object(name, recid)?;
    Ok(recid)
}

impl OpenState {
    /// Opens the record store under `layout` and loads or creates every
    /// root: header, clock, surfaces, pyramids, file index, tile index.
    pub fn load(layout: CacheLayout, checkpoint_bytes: u64, surface_cache: usize) -> Result<Self> {
        let store = Arc::new(RecordStore::open(layout.root(), checkpoint_bytes)?);

        let expected = Header::current();
        match named_record(&store, HEADER_NAME)? {
            Some((_, blob)) => expected.check(&Header::decode(&blob)?)?,
            None => {
                create_named(&store, HEADER_NAME, &expected.encode())?;
            }
        }

        let (clock_recid, clock) = match named_record(&store, TS_NAME)? {
            Some((recid, blob)) => (recid, Clock::decode(&blob)?),
            None => {
                let clock = Clock::new();
                (create_named(&store, TS_NAME, &clock.encode())?, clock)
            }
        };

        let (surfaces_recid, surfaces) = match named_record(&store, ELEVATION_SURFACE_SET_NAME)? {
            Some((recid, blob)) => (recid, SurfaceRegistry::decode(&blob)?),
            None => {
                let reg = SurfaceRegistry::new();
                (create_named(&store, ELEVATION_SURFACE_SET_NAME, &reg.encode())?, reg)
            }
        };

        let (pyramids_recid, pyramids) = match named_record(&store, TILE_PYRAMID_SET_NAME)? {
            Some((recid, blob)) => (recid, PyramidRegistry::decode(&blob)?),
            None => {
                let reg = PyramidRegistry::new();
                (create_named(&store, TILE_PYRAMID_SET_NAME, &reg.encode())?, reg)
            }
        };

        let file_index = match store.named_object(FILE_SET_NAME)? {
            Some(recid) => FileIndex::load(store.clone(), recid)?,
            None => {
                let index = FileIndex::create(store.clone())?;
                store.set_named_object(FILE_SET_NAME, index.recid())?;
                index
            }
        };

        let tile_index = match store.named_object(TILE_SET_NAME)? {
            Some(recid) => TileIndex::load(store.clone(), recid)?,
            None => {
                let index = TileIndex::create(store.clone())?;
                store.set_named_object(TILE_SET_NAME, index.recid())?;
                index
            }
        };

        debug!(
            cache_dir = %layout.root().display(),
            tick = clock.ts(),
            tiles = tile_index.len(),
            files = file_index.len(),
            surfaces = surfaces.len(),
            "cache roots loaded"
        );

        Ok(Self {
            layout,
            store,
            clock,
            clock_recid,
            pyramids: Mutex::new(pyramids),
            pyramids_recid,
            pyramids_dirty: AtomicBool::new(false),
            surfaces: Mutex::new(surfaces),
            surfaces_recid,
            surfaces_dirty: AtomicBool::new(false),
            surface_indexes: Mutex::new(SurfaceIndexCache::new(surface_cache)),
            tile_index,
            tile_gate: TileGate::new(),
            file_index,
            file_lock: Mutex::new(()),
        })
    }

    /// Writes the clock and registries if dirty, then flushes the store.
    ///
    /// Locks both registries, so it must not be called while holding a
    /// registry or surface entry lock.
    pub fn commit(&self) -> Result<()> {
        if self.clock.take_dirty() {
            if let Err(e) = self.store.update_record(self.clock_recid, &self.clock.encode()) {
                self.clock.mark_dirty();
                return Err(e.into());
            }
        }
        if self.pyramids_dirty.swap(false, Ordering::SeqCst) {
            let blob = self.pyramids.lock().encode();
            if let Err(e) = self.store.update_record(self.pyramids_recid, &blob) {
                self.pyramids_dirty.store(true, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        if self.surfaces_dirty.swap(false, Ordering::SeqCst) {
            let blob = self.surfaces.lock().encode();
            if let Err(e) = self.store.update_record(self.surfaces_recid, &blob) {
                self.surfaces_dirty.store(true, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        self.store.commit()?;
        Ok(())
    }

    pub fn mark_surfaces_dirty(&self) {
        self.surfaces_dirty.store(true, Ordering::SeqCst);
    }

    /// Materialized index of the surface stored at `recid`, loading it from
    /// the store when it is no longer cached.
    pub fn surface_index(&self, recid: RecId) -> Result<Arc<ElevationIndex>> {
        let mut cache = self.surface_indexes.lock();
        if let Some(index) = cache.get(recid) {
            return Ok(index);
        }
        let index = Arc::new(ElevationIndex::load(self.store.clone(), recid)?);
        cache.insert(index.clone());
        Ok(index)
    }
}
