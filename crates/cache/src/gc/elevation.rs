//! Elevation GC: applies the cutoff to elevation samples and reclaims
//! retired surfaces.
//!
//! Retired surface indexes are drained entry by entry before their
//! descriptor is dropped, so reclaiming a large surface never stalls the
//! store. Live surfaces are browsed in bursts of at most `elevation_slice`
//! under the surface's own lock, deleting at most one stale sample per
//! burst.

use index::{IndexError, OrderedIndex};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::error::{CacheError, Result};
use crate::gc::{Pacer, StopSignal};
use crate::manager::ManagerInner;
use crate::model::{ElevationIndex, ElevationPassReport};
use crate::registry::SurfaceEntry;
use crate::state::OpenState;

/// Collector thread body. Exits for good once the bad-entry counter passes
/// its threshold, handing the store over to a rebuild.
pub(crate) fn run(inner: Arc<ManagerInner>, state: Arc<OpenState>, stop: Arc<StopSignal>) {
    debug!("elevation gc started");
    if stop.sleep(inner.config.startup_delay) {
        return;
    }
    let mut prev_cutoff = None;
    while !stop.is_stopped() && !state.store.is_closed() {
        let bad = inner.bad_entries.load(Ordering::SeqCst);
        if bad > inner.config.max_bad_entries {
            error!(bad_entries = bad, "too many bad cache entries, rebuilding cache database");
            inner.spawn_recreate();
            return;
        }
        match elevation_pass(&inner, &state, &stop, &mut prev_cutoff, false) {
            Ok(report) if report.idle => {
                if stop.sleep(inner.config.idle_backoff) {
                    break;
                }
            }
            Ok(report) => {
                debug!(
                    indexes_drained = report.indexes_drained,
                    samples_evicted = report.samples_evicted,
                    surfaces_dropped = report.surfaces_dropped,
                    "elevation gc pass"
                );
                std::thread::yield_now();
            }
            Err(e) => {
                inner.report(&e, "elevation gc pass");
                if stop.sleep(inner.config.idle_backoff) {
                    break;
                }
            }
        }
    }
    debug!("elevation gc stopped");
}

/// One pass: drain retired surfaces, then sweep live ones unless nothing
/// changed since the previous pass (`force` sweeps regardless).
pub(crate) fn elevation_pass(
    inner: &ManagerInner,
    state: &OpenState,
    stop: &StopSignal,
    prev_cutoff: &mut Option<i32>,
    force: bool,
) -> Result<ElevationPassReport> {
    let mut report = ElevationPassReport::default();
    let mut pacer = Pacer::new();

    report.indexes_drained = drain_retired(inner, state, stop, &mut pacer)?;
    if stop.is_stopped() {
        return Ok(report);
    }

    let cutoff = state.clock.gc_cutoff();
    let under_budget = state.clock.total_size() < inner.config.max_cache_size;
    if !force && under_budget && *prev_cutoff == Some(cutoff) {
        report.idle = true;
        return Ok(report);
    }
    *prev_cutoff = Some(cutoff);

    let surfaces = state.surfaces.lock().entries();
    for (name, entry) in surfaces {
        if stop.is_stopped() {
            break;
        }
        let recid = {
            let rec = entry.lock();
            if rec.retired {
                continue;
            }
            rec.recid
        };
        let index = match state.surface_index(recid) {
            Ok(index) => index,
            Err(e) => {
                inner.report(&e, "loading elevation surface");
                continue;
            }
        };
        match sweep_surface(inner, &entry, &index, stop, cutoff, &mut pacer) {
            Ok(evicted) => report.samples_evicted += evicted,
            Err(e) => {
                inner.report(&e, "elevation surface sweep");
                continue;
            }
        }
        match drop_if_expired(state, &name, &entry, &index, cutoff) {
            Ok(true) => report.surfaces_dropped += 1,
            Ok(false) => {}
            Err(e) => inner.report(&e, "dropping elevation surface"),
        }
    }
    Ok(report)
}

/// Empties and destroys every queued retired index.
fn drain_retired(
    inner: &ManagerInner,
    state: &OpenState,
    stop: &StopSignal,
    pacer: &mut Pacer,
) -> Result<usize> {
    let pending = state.surfaces.lock().pending_deletions();
    let mut drained = 0;
    for recid in pending {
        let cached = state.surface_indexes.lock().remove(recid);
        let index = match cached {
            Some(index) => index,
            None => match ElevationIndex::load(state.store.clone(), recid) {
                Ok(index) => Arc::new(index),
                Err(IndexError::Missing(_)) => {
                    state.surfaces.lock().finish_deletion(recid);
                    state.mark_surfaces_dirty();
                    state.commit()?;
                    continue;
                }
                Err(e) => {
                    inner.report(&CacheError::from(e), "loading retired surface");
                    continue;
                }
            },
        };

        let slice = inner.config.elevation_slice;
        loop {
            let started = Instant::now();
            let mut emptied = false;
            while started.elapsed() < slice {
                if index.pop_first()?.is_none() {
                    emptied = true;
                    break;
                }
            }
            if emptied {
                break;
            }
            if pacer.pace(stop) {
                return Ok(drained);
            }
        }

        index.destroy()?;
        state.surfaces.lock().finish_deletion(recid);
        state.mark_surfaces_dirty();
        state.commit()?;
        drained += 1;
        debug!(recid, "retired elevation surface reclaimed");
    }
    Ok(drained)
}

/// Browses one surface, deleting samples older than `cutoff`.
fn sweep_surface(
    inner: &ManagerInner,
    entry: &SurfaceEntry,
    index: &ElevationIndex,
    stop: &StopSignal,
    cutoff: i32,
    pacer: &mut Pacer,
) -> Result<usize> {
    let slice = inner.config.elevation_slice;
    let mut cursor: Option<Vec<u8>> = None;
    let mut evicted = 0;
    loop {
        {
            let mut rec = entry.lock();
            if !entry.wait_while_busy(&mut rec, || !stop.is_stopped()) || rec.retired {
                return Ok(evicted);
            }
            let started = Instant::now();
            loop {
                let Some((key, sample)) = index.next_after(cursor.as_deref())? else {
                    return Ok(evicted);
                };
                let stale = sample.tick < cutoff;
                if stale {
                    index.remove(&key)?;
                    evicted += 1;
                }
                cursor = Some(key);
                if stale || started.elapsed() >= slice {
                    break;
                }
            }
        }
        if pacer.pace(stop) {
            return Ok(evicted);
        }
    }
}

/// Drops a surface whose index is empty and whose own tick is older than
/// `cutoff`. Returns whether it was dropped.
fn drop_if_expired(
    state: &OpenState,
    name: &str,
    entry: &Arc<SurfaceEntry>,
    index: &ElevationIndex,
    cutoff: i32,
) -> Result<bool> {
    {
        let mut registry = state.surfaces.lock();
        let mut rec = entry.lock();
        if rec.busy || rec.retired || !index.is_empty() || rec.last_access_tick >= cutoff {
            return Ok(false);
        }
        rec.retired = true;
        registry.remove_if_same(name, entry);
    }
    entry.notify_all();
    state.surface_indexes.lock().remove(index.recid());
    index.destroy()?;
    state.mark_surfaces_dirty();
    state.commit()?;
    debug!(surface = name, "expired elevation surface dropped");
    Ok(true)
}
