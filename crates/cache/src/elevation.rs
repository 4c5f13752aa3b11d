//! Elevation cache handles.
//!
//! A handle names a surface and optionally carries the model parameters
//! the caller expects. Binding it resolves the surface in the registry:
//!
//! 1. closed manager: the handle stays unbound;
//! 2. a registered surface with a different model version is retired and
//!    treated as absent;
//! 3. absent and no parameters: read-only, stays unbound;
//! 4. absent with parameters: a fresh surface and index are created;
//! 5. present: its index is materialized (cache hit or reload);
//! 6. the surface is stamped with the current tick and the roots committed.
//!
//! Handles re-bind transparently after the manager reopens or when their
//! surface is retired underneath them.

use codec::ElevationRecord;
use index::OrderedIndex;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use store::RecId;

use crate::error::Result;
use crate::manager::{CacheManager, ManagerInner};
use crate::model::{ElevationIndex, ModelParams};
use crate::registry::{SurfaceEntry, SurfaceRecord};
use crate::state::OpenState;

/// A bound surface: everything an operation needs, cloned out of the
/// binding so the binding lock is not held during the operation.
#[derive(Clone)]
pub(crate) struct BoundSurface {
    state: Arc<OpenState>,
    entry: Arc<SurfaceEntry>,
    recid: RecId,
}

struct Binding {
    /// Manager generation this binding was made against; 0 = never.
    generation: u64,
    surface: Option<BoundSurface>,
}

/// Handle to one elevation surface. See the module docs for binding rules.
pub struct ElevationCache {
    inner: Weak<ManagerInner>,
    name: String,
    query: Option<ModelParams>,
    binding: Mutex<Binding>,
    /// Entry this handle marked busy, cleared by `unlock` even if the
    /// handle has re-bound since.
    held: Mutex<Option<Arc<SurfaceEntry>>>,
}

impl std::fmt::Debug for ElevationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationCache")
            .field("name", &self.name)
            .field("query", &self.query)
            .finish()
    }
}

impl CacheManager {
    /// Handle to the elevation surface `name`.
    ///
    /// With `query` the surface is created (or replaced, if the stored model
    /// version differs) as needed and the handle is writable. Without it the
    /// handle can only read a surface that already exists.
    pub fn elevation_cache(&self, name: &str, query: Option<ModelParams>) -> ElevationCache {
        let cache = ElevationCache {
            inner: Arc::downgrade(&self.inner),
            name: name.to_string(),
            query,
            binding: Mutex::new(Binding {
                generation: 0,
                surface: None,
            }),
            held: Mutex::new(None),
        };
        let _ = cache.bound();
        cache
    }
}

impl ManagerInner {
    /// Resolves `name` in the surface registry, creating or replacing the
    /// surface as `query` demands. `Ok(None)` means read-only and absent.
    pub(crate) fn bind_surface(
        &self,
        name: &str,
        query: Option<&ModelParams>,
    ) -> Result<Option<BoundSurface>> {
        let Some(state) = self.live_state() else {
            return Ok(None);
        };

        let entry = {
            let mut registry = state.surfaces.lock();
            let mut found = registry.get(name);
            if let (Some(entry), Some(q)) = (&found, query) {
                let stored = entry.lock().params.version;
                if stored != q.version {
                    registry.retire(name);
                    state.mark_surfaces_dirty();
                    tracing::info!(
                        surface = name,
                        stored,
                        requested = q.version,
                        "elevation surface is stale, replacing"
                    );
                    found = None;
                }
            }
            match (found, query) {
                (Some(entry), _) => Some(entry),
                (None, None) => None,
                (None, Some(q)) => {
                    let index = Arc::new(ElevationIndex::create(state.store.clone())?);
                    let recid = index.recid();
                    state.surface_indexes.lock().insert(index);
                    state.mark_surfaces_dirty();
                    Some(registry.insert(name, SurfaceRecord::new(*q, recid)))
                }
            }
        };

        let Some(entry) = entry else {
            state.commit()?;
            return Ok(None);
        };
        let recid = {
            let mut rec = entry.lock();
            rec.last_access_tick = state.clock.ts();
            rec.recid
        };
        state.surface_index(recid)?;
        state.mark_surfaces_dirty();
        state.commit()?;
        Ok(Some(BoundSurface {
            state,
            entry,
            recid,
        }))
    }
}

impl ElevationCache {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current binding, re-binding first if the manager was reopened or the
    /// surface was retired.
    fn bound(&self) -> Option<BoundSurface> {
        let inner = self.inner.upgrade()?;
        if !inner.enabled.load(Ordering::SeqCst) {
            return None;
        }
        let mut binding = self.binding.lock();
        let generation = inner.generation();
        let retired = binding
            .surface
            .as_ref()
            .map_or(false, |s| s.entry.lock().retired);
        if binding.generation != generation || retired {
            binding.generation = generation;
            binding.surface = match inner.bind_surface(&self.name, self.query.as_ref()) {
                Ok(surface) => surface,
                Err(e) => {
                    inner.report(&e, "binding elevation surface");
                    None
                }
            };
        }
        binding.surface.clone()
    }

    /// Runs `op` under the surface lock. Retries once if the surface was
    /// retired between binding and locking; commits afterwards if asked.
    fn with_surface<T>(
        &self,
        commit: bool,
        op: impl Fn(&BoundSurface, &mut MutexGuard<'_, SurfaceRecord>) -> Result<T>,
    ) -> Option<T> {
        let inner = self.inner.upgrade()?;
        for _ in 0..2 {
            let surface = self.bound()?;
            let mut rec = surface.entry.lock();
            if rec.retired {
                continue;
            }
            let result = op(&surface, &mut rec);
            drop(rec);
            return match result {
                Ok(value) => {
                    if commit {
                        if let Err(e) = surface.state.commit() {
                            inner.report(&e, "elevation commit");
                        }
                    }
                    Some(value)
                }
                Err(e) => {
                    inner.report(&e, "elevation cache");
                    None
                }
            };
        }
        None
    }

    /// Looks up `key`, re-stamping a hit with the current tick.
    pub fn get(&self, key: &[u8]) -> Option<ElevationRecord> {
        self.with_surface(false, |surface, _rec| {
            let index = surface.state.surface_index(surface.recid)?;
            let Some(mut record) = index.get(key)? else {
                return Ok(None);
            };
            record.tick = surface.state.clock.ts();
            index.insert(key, &record)?;
            Ok(Some(record))
        })
        .flatten()
    }

    /// Stores a sample stamped with the current tick. Returns `false` on a
    /// read-only or dead handle, or on failure.
    pub fn set(&self, key: &[u8], height: i32, delta_height: i32) -> bool {
        self.with_surface(true, |surface, _rec| {
            let index = surface.state.surface_index(surface.recid)?;
            let record = ElevationRecord::new(height, delta_height, surface.state.clock.ts());
            index.insert(key, &record)?;
            Ok(())
        })
        .is_some()
    }

    /// Marks the surface busy so the Elevation GC leaves it alone, waiting
    /// for any other holder first. Returns `false` if closed or unbound.
    pub fn lock(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let Some(surface) = self.bound() else {
            return false;
        };
        let mut rec = surface.entry.lock();
        let enabled = || inner.enabled.load(Ordering::SeqCst);
        if !surface.entry.wait_while_busy(&mut rec, enabled) || rec.retired || !enabled() {
            return false;
        }
        rec.busy = true;
        drop(rec);
        *self.held.lock() = Some(surface.entry);
        true
    }

    /// Clears the busy flag set by [`ElevationCache::lock`] on the surface
    /// it was set on. Does nothing if this handle holds no lock.
    pub fn unlock(&self) {
        let held = self.held.lock().take();
        if let Some(entry) = held {
            entry.lock().busy = false;
            entry.notify_all();
        }
    }

    /// Model parameters the bound surface was created with.
    pub fn model_params(&self) -> Option<ModelParams> {
        self.with_surface(false, |_, rec| Ok(rec.params))
    }

    /// Whether the handle is bound to a surface (and so accepts `set`).
    pub fn is_writable(&self) -> bool {
        self.bound().is_some()
    }
}
