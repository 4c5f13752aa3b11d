//! Tile GC: enforces the size budget and moves the eviction cutoff.
//!
//! # Pass
//!
//! 1. Walk the tile index in slices of at most `tile_slice` under the tile
//!    gate, removing entries older than the cutoff (one per slice).
//! 2. Walk `Tiles/`, deleting files with no index entry and sampling the
//!    size of the rest at their entry's tick.
//! 3. Walk the file index, evicting stale URLs and sampling the rest.
//! 4. Build the size/age histogram from the samples plus the store's own
//!    size at the current tick. If the total is over budget, advance the
//!    cutoff to the histogram's cut; the next pass evicts below it.

use codec::TileKey;
use index::{HashIndex, OrderedIndex};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gc::{Pacer, StopSignal};
use crate::histogram::TsSize;
use crate::layout::{self, CacheLayout};
use crate::manager::ManagerInner;
use crate::model::TilePassReport;
use crate::state::OpenState;

/// Collector thread body.
pub(crate) fn run(inner: Arc<ManagerInner>, state: Arc<OpenState>, stop: Arc<StopSignal>) {
    debug!("tile gc started");
    if stop.sleep(inner.config.startup_delay) {
        return;
    }
    let mut hist = TsSize::new(inner.config.histogram_buckets);
    while !stop.is_stopped() && !state.store.is_closed() {
        let before = state.clock.gc_cutoff();
        let report = tile_pass(&inner, &state, &stop, &mut hist);
        debug!(
            tiles_evicted = report.tiles_evicted,
            orphans_removed = report.orphans_removed,
            files_evicted = report.files_evicted,
            total_size = report.total_size,
            cutoff = report.cutoff,
            "tile gc pass"
        );
        let evicted = report.tiles_evicted + report.orphans_removed + report.files_evicted;
        let settled = evicted == 0 && report.cutoff == before;
        if report.total_size <= inner.config.max_cache_size || settled {
            if stop.sleep(inner.config.idle_backoff) {
                break;
            }
        } else {
            std::thread::yield_now();
        }
    }
    debug!("tile gc stopped");
}

/// One full pass. Sub-walk failures are reported and the pass goes on.
pub(crate) fn tile_pass(
    inner: &ManagerInner,
    state: &OpenState,
    stop: &StopSignal,
    hist: &mut TsSize,
) -> TilePassReport {
    let cutoff = state.clock.gc_cutoff();
    let mut report = TilePassReport {
        cutoff,
        ..Default::default()
    };
    let mut samples: Vec<(i32, u64)> = Vec::new();
    let mut pacer = Pacer::new();

    match walk_tile_index(inner, state, stop, cutoff, &mut pacer) {
        Ok(n) => report.tiles_evicted = n,
        Err(e) => inner.report(&e, "tile index walk"),
    }
    if stop.is_stopped() {
        return report;
    }
    match walk_tile_dirs(inner, state, stop, &mut pacer, &mut samples) {
        Ok(n) => report.orphans_removed = n,
        Err(e) => inner.report(&e, "tile directory walk"),
    }
    if stop.is_stopped() {
        return report;
    }
    match walk_file_index(state, stop, cutoff, &mut pacer, &mut samples) {
        Ok(n) => report.files_evicted = n,
        Err(e) => inner.report(&e, "file index walk"),
    }
    if stop.is_stopped() {
        return report;
    }

    let tick = state.clock.ts();
    let oldest = samples.iter().map(|(t, _)| *t).min().unwrap_or(tick);
    hist.init(cutoff.max(oldest), tick);
    for (t, bytes) in &samples {
        hist.add(*t, *bytes);
    }
    hist.add(tick, state.store.size_on_disk());

    let budget = inner.config.max_cache_size;
    let total = hist.size();
    state.clock.set_total_size(total);
    report.total_size = total;
    report.cutoff = if total > budget {
        state.clock.advance_gc_cutoff(hist.cut_ts(budget))
    } else {
        state.clock.gc_cutoff()
    };

    if let Err(e) = state.commit() {
        inner.report(&e, "commit after tile gc");
    }
    report
}

fn walk_tile_index(
    inner: &ManagerInner,
    state: &OpenState,
    stop: &StopSignal,
    cutoff: i32,
    pacer: &mut Pacer,
) -> Result<usize> {
    let slice = inner.config.tile_slice;
    let mut cursor: Option<Vec<u8>> = None;
    let mut evicted = 0;
    loop {
        let Some(gate) = state.tile_gate.acquire(&inner.enabled) else {
            return Ok(evicted);
        };
        let started = Instant::now();
        loop {
            let Some((key, tick)) = state.tile_index.next_after(cursor.as_deref())? else {
                return Ok(evicted);
            };
            let stale = tick < cutoff;
            if stale {
                state.tile_index.remove(&key)?;
                evicted += 1;
            }
            cursor = Some(key);
            if stale || started.elapsed() >= slice {
                break;
            }
        }
        drop(gate);
        if pacer.pace(stop) {
            return Ok(evicted);
        }
    }
}

/// A tile file found on disk: path components below the pyramid
/// directory, full path, length.
type TileFile = (Vec<String>, PathBuf, u64);

fn collect_files(dir: &Path, prefix: &mut Vec<String>, out: &mut Vec<TileFile>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        prefix.push(entry.file_name().to_string_lossy().into_owned());
        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), prefix, out)?;
        } else {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            out.push((prefix.clone(), entry.path(), len));
        }
        prefix.pop();
    }
    Ok(())
}

fn walk_tile_dirs(
    inner: &ManagerInner,
    state: &OpenState,
    stop: &StopSignal,
    pacer: &mut Pacer,
    samples: &mut Vec<(i32, u64)>,
) -> Result<usize> {
    let slice = inner.config.tile_slice;
    let mut removed = 0;
    for entry in fs::read_dir(state.layout.tiles_dir())? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let pyramid = CacheLayout::parse_pyramid_dir(&name).filter(|_| path.is_dir());
        let Some(pyramid_id) = pyramid else {
            warn!(path = %path.display(), "removing stray entry in tile directory");
            layout::remove_path(&path)?;
            removed += 1;
            continue;
        };

        let mut files = Vec::new();
        collect_files(&path, &mut Vec::new(), &mut files)?;
        let mut pending = files.into_iter().peekable();
        while pending.peek().is_some() {
            let Some(gate) = state.tile_gate.acquire(&inner.enabled) else {
                return Ok(removed);
            };
            let started = Instant::now();
            for (components, file, len) in pending.by_ref() {
                let key = CacheLayout::parse_tile_components(&components)
                    .map(|code| TileKey::new(pyramid_id, code).encode());
                let tick = match key {
                    Some(key) => state.tile_index.get(&key)?,
                    None => None,
                };
                match tick {
                    Some(tick) => samples.push((tick, len)),
                    None => {
                        layout::remove_path(&file)?;
                        removed += 1;
                    }
                }
                if started.elapsed() >= slice {
                    break;
                }
            }
            drop(gate);
            if pacer.pace(stop) {
                return Ok(removed);
            }
        }
    }
    Ok(removed)
}

fn walk_file_index(
    state: &OpenState,
    stop: &StopSignal,
    cutoff: i32,
    pacer: &mut Pacer,
    samples: &mut Vec<(i32, u64)>,
) -> Result<usize> {
    let mut evicted = 0;
    for url in state.file_index.keys() {
        if pacer.pace(stop) {
            break;
        }
        let _files = state.file_lock.lock();
        let Some(record) = state.file_index.get(&url)? else {
            continue;
        };
        let path = state.layout.file_path(record.file_id);
        if record.tick < cutoff {
            state.file_index.remove(&url)?;
            if let Err(e) = layout::discard_file(&path) {
                warn!(path = %path.display(), error = %e, "could not delete cached file");
            }
            evicted += 1;
        } else {
            let len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            samples.push((record.tick, len));
        }
    }
    Ok(evicted)
}
