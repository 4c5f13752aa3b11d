//! Tile lookups.

use codec::TileKey;
use index::OrderedIndex;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::layout::CacheLayout;
use crate::manager::{CacheManager, ManagerInner};
use crate::state::OpenState;

impl CacheManager {
    /// Stamps the tile `(pyramid, position_code)` as used now and returns
    /// the path of its backing file (parent directories created).
    ///
    /// Returns `None` when closed, when the position code or suffix cannot
    /// be mapped to a file name, or on an index failure. The caller does
    /// the actual reading or writing.
    pub fn tile_cache_file(&self, pyramid: &str, position_code: &str, suffix: &str) -> Option<PathBuf> {
        self.inner.tile_cache_file(pyramid, position_code, suffix)
    }
}

impl ManagerInner {
    pub(crate) fn tile_cache_file(
        &self,
        pyramid: &str,
        position_code: &str,
        suffix: &str,
    ) -> Option<PathBuf> {
        if !CacheLayout::is_valid_tile_name(position_code, suffix) {
            return None;
        }
        let state = self.live_state()?;
        match self.touch_tile(&state, pyramid, position_code, suffix) {
            Ok(path) => path,
            Err(e) => {
                self.report(&e, "tile lookup");
                None
            }
        }
    }

    fn touch_tile(
        &self,
        state: &OpenState,
        pyramid: &str,
        position_code: &str,
        suffix: &str,
    ) -> Result<Option<PathBuf>> {
        let (pyramid_id, created) = state.pyramids.lock().resolve(pyramid)?;
        if created {
            state.pyramids_dirty.store(true, Ordering::SeqCst);
            state.commit()?;
        }
        let Some(path) = state.layout.tile_path(pyramid_id, position_code, suffix) else {
            return Ok(None);
        };

        let key = TileKey::new(pyramid_id, position_code).encode();
        {
            let Some(_gate) = state.tile_gate.acquire(&self.enabled) else {
                return Ok(None);
            };
            state.tile_index.insert(&key, &state.clock.new_ts())?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        state.commit()?;
        Ok(Some(path))
    }
}
