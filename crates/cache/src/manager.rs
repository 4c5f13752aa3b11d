//! Cache manager: lifecycle, maintenance and shared plumbing.
//!
//! The foreground operations live in `tiles.rs`, `files.rs` and
//! `elevation.rs` as further `impl` blocks on [`ManagerInner`] and
//! [`CacheManager`].
//!
//! ## Lock order
//!
//! ```text
//! lifecycle → state slot
//! handle binding → surface registry → surface entry → surface index cache
//!     → index → record store
//! pyramid registry → record store
//! file lock → file index → record store
//! ```
//!
//! `OpenState::commit` takes both registries and every surface entry, so it
//! is only ever called with none of those held.

use config::CacheConfig;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use index::{HashIndex, OrderedIndex};

use crate::error::{CacheError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::gc::{self, GcDaemon, StopSignal};
use crate::histogram::TsSize;
use crate::layout::{self, CacheLayout};
use crate::model::{CacheStats, DeleteOutcome, GcReport};
use crate::state::OpenState;

type RestartNotice = Box<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
struct Lifecycle {
    /// Directory of the current (or last) open.
    root: Option<PathBuf>,
    daemons: Vec<GcDaemon>,
    stop: Option<Arc<StopSignal>>,
}

pub(crate) struct ManagerInner {
    pub config: CacheConfig,
    pub fetcher: Arc<dyn Fetcher>,
    pub enabled: AtomicBool,
    pub bad_entries: AtomicU32,
    /// Bumped on every successful open; handles re-bind when it changes.
    generation: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    state: RwLock<Option<Arc<OpenState>>>,
    restart_notice: RwLock<RestartNotice>,
}

/// Persistent tile, elevation and file cache rooted in one directory.
///
/// Create one per process with [`CacheManager::new`], then
/// [`open`](CacheManager::open) a directory. Every operation other than
/// `open` and `commit` swallows errors: a failure is logged, corruption is
/// counted toward an automatic rebuild, and the caller sees an empty result.
///
/// Dropping the manager closes it and waits for both collectors.
pub struct CacheManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("open", &self.is_open())
            .field("root", &self.inner.lifecycle.lock().root)
            .finish()
    }
}

impl CacheManager {
    /// Manager fetching over HTTP with `config.fetch_timeout`.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: CacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let default_notice: RestartNotice = Box::new(|root: &Path| {
            error!(
                cache_dir = %root.display(),
                "cache database could not be deleted; restart the application to finish"
            );
        });
        Self {
            inner: Arc::new(ManagerInner {
                config,
                fetcher,
                enabled: AtomicBool::new(false),
                bad_entries: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                lifecycle: Mutex::new(Lifecycle::default()),
                state: RwLock::new(None),
                restart_notice: RwLock::new(default_notice),
            }),
        }
    }

    /// Replaces the hook run when `delete` has to be finished by a restart.
    pub fn with_restart_notice<F>(self, notice: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        *self.inner.restart_notice.write() = Box::new(notice);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Opens (or creates) the cache in `root` and starts both collectors.
    /// An already open cache is closed first.
    pub fn open(&self, root: impl AsRef<Path>) -> Result<()> {
        self.inner.open(root.as_ref())
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Disables the manager, stops the collectors (waiting for them if
    /// `wait`), then commits and closes the store. Never fails.
    pub fn close(&self, wait: bool) {
        let mut lifecycle = self.inner.lifecycle.lock();
        self.inner.close_locked(&mut lifecycle, wait);
    }

    /// Persists dirty roots and flushes the store. A no-op when closed.
    pub fn commit(&self) -> Result<()> {
        match self.inner.live_state() {
            Some(state) => state.commit(),
            None => Ok(()),
        }
    }

    /// Closes the cache and moves its files aside for deletion.
    pub fn delete(&self) -> DeleteOutcome {
        let mut lifecycle = self.inner.lifecycle.lock();
        self.inner.close_locked(&mut lifecycle, true);
        match lifecycle.root.clone() {
            Some(root) => self.inner.delete_files(&CacheLayout::new(root)),
            None => DeleteOutcome::Removed,
        }
    }

    /// Deletes the cache and reopens it empty in the same directory.
    pub fn recreate(&self) -> Result<()> {
        self.inner.recreate_if(None)
    }

    pub fn stats(&self) -> Option<CacheStats> {
        let state = self.inner.live_state()?;
        let (surfaces, pending) = {
            let reg = state.surfaces.lock();
            (reg.len(), reg.pending_deletions().len())
        };
        let pyramids = state.pyramids.lock().len();
        Some(CacheStats {
            tick: state.clock.ts(),
            gc_cutoff: state.clock.gc_cutoff(),
            total_size: state.clock.total_size(),
            tiles: state.tile_index.len(),
            files: state.file_index.len(),
            pyramids,
            surfaces,
            pending_deletions: pending,
            bad_entries: self.inner.bad_entries.load(Ordering::SeqCst),
            store_bytes: state.store.size_on_disk(),
        })
    }

    /// Runs one Tile GC pass and one Elevation GC pass on the calling
    /// thread. The elevation pass always sweeps, even when idle.
    pub fn run_gc_pass(&self) -> Option<GcReport> {
        let state = self.inner.live_state()?;
        let stop = self.inner.lifecycle.lock().stop.clone()?;
        let mut hist = TsSize::new(self.inner.config.histogram_buckets);
        let tiles = gc::tile::tile_pass(&self.inner, &state, &stop, &mut hist);
        let mut prev_cutoff = None;
        let elevations =
            match gc::elevation::elevation_pass(&self.inner, &state, &stop, &mut prev_cutoff, true) {
                Ok(report) => report,
                Err(e) => {
                    self.inner.report(&e, "elevation gc pass");
                    Default::default()
                }
            };
        Some(GcReport { tiles, elevations })
    }

    /// Whether either collector thread is still alive.
    pub fn collectors_running(&self) -> bool {
        self.inner
            .lifecycle
            .lock()
            .daemons
            .iter()
            .any(GcDaemon::is_running)
    }

    /// Advances the logical clock; `None` when closed.
    pub fn new_ts(&self) -> Option<i32> {
        Some(self.inner.live_state()?.clock.new_ts())
    }

    /// Current logical tick; `None` when closed.
    pub fn ts(&self) -> Option<i32> {
        Some(self.inner.live_state()?.clock.ts())
    }

    /// Allocates a file id; `None` when closed.
    pub fn new_file_id(&self) -> Option<i32> {
        Some(self.inner.live_state()?.clock.new_file_id())
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.close(true);
    }
}

/// Deletes `paths` on a background thread, logging failures.
fn purge_async(paths: Vec<PathBuf>) {
    let spawned = thread::Builder::new()
        .name("vgcache-purge".to_string())
        .spawn(move || {
            for path in paths {
                match layout::remove_path(&path) {
                    Ok(()) => debug!(path = %path.display(), "purged"),
                    Err(e) => warn!(path = %path.display(), error = %e, "could not purge"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start purge thread");
    }
}

impl ManagerInner {
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Open state, or `None` when the manager is disabled.
    pub fn live_state(&self) -> Option<Arc<OpenState>> {
        if !self.enabled.load(Ordering::SeqCst) {
            return None;
        }
        self.state.read().clone()
    }

    pub fn is_open(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
            && self
                .state
                .read()
                .as_ref()
                .map_or(false, |s| !s.store.is_closed())
    }

    /// Logs a swallowed error; corruption also bumps the bad-entry counter.
    pub fn report(&self, e: &CacheError, what: &str) {
        if e.is_closed() {
            debug!(error = %e, "{what} raced shutdown");
        } else if e.is_corruption() {
            let bad = self.bad_entries.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(error = %e, bad_entries = bad, "{what}: possibly bad cache database");
        } else {
            warn!(error = %e, "{what} failed");
        }
    }

    fn open(self: &Arc<Self>, root: &Path) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.open_locked(&mut lifecycle, root)
    }

    fn open_locked(self: &Arc<Self>, lifecycle: &mut Lifecycle, root: &Path) -> Result<()> {
        // Also joins collectors left running by an earlier `close(false)`.
        self.close_locked(lifecycle, true);
        lifecycle.root = Some(root.to_path_buf());

        let layout = CacheLayout::new(root);
        fs::create_dir_all(root)?;

        let db_len = fs::metadata(layout.db_path()).map(|m| m.len()).unwrap_or(0);
        if db_len > self.config.max_cache_size / 2 || layout.sentinel_path().exists() {
            info!(cache_dir = %root.display(), db_bytes = db_len, "deleting cache before open");
            self.delete_files(&layout);
        } else {
            let leftovers: Vec<PathBuf> = layout
                .old_artifacts()
                .into_iter()
                .filter(|p| p.exists())
                .collect();
            if !leftovers.is_empty() {
                purge_async(leftovers);
            }
        }

        layout.create_dirs()?;
        match layout.sweep_partial_downloads() {
            Ok(0) => {}
            Ok(removed) => info!(removed, "removed partial downloads"),
            Err(e) => warn!(error = %e, "could not sweep partial downloads"),
        }

        let state = match OpenState::load(
            layout.clone(),
            self.config.log_checkpoint_bytes,
            self.config.surface_cache_capacity,
        ) {
            Ok(state) => Arc::new(state),
            Err(e) => {
                if e.needs_rebuild() {
                    error!(cache_dir = %root.display(), error = %e, "unusable cache database");
                    if let Err(we) = fs::write(layout.sentinel_path(), b"") {
                        warn!(error = %we, "could not write delete sentinel");
                    }
                }
                return Err(e);
            }
        };
        state.commit()?;

        self.bad_entries.store(0, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.write() = Some(state.clone());
        self.enabled.store(true, Ordering::SeqCst);

        let stop = Arc::new(StopSignal::new());
        lifecycle.stop = Some(stop.clone());
        let spawned = {
            let (inner, st, sp) = (self.clone(), state.clone(), stop.clone());
            GcDaemon::spawn("vgcache-tile-gc", move || gc::tile::run(inner, st, sp))
        }
        .and_then(|tile| {
            let (inner, st, sp) = (self.clone(), state.clone(), stop.clone());
            let elevation =
                GcDaemon::spawn("vgcache-elevation-gc", move || gc::elevation::run(inner, st, sp))?;
            Ok(vec![tile, elevation])
        });
        match spawned {
            Ok(daemons) => lifecycle.daemons = daemons,
            Err(e) => {
                self.close_locked(lifecycle, true);
                return Err(e.into());
            }
        }

        purge_async(layout.old_artifacts());
        info!(cache_dir = %root.display(), tick = state.clock.ts(), "cache opened");
        Ok(())
    }

    fn close_locked(&self, lifecycle: &mut Lifecycle, wait: bool) {
        let was_enabled = self.enabled.swap(false, Ordering::SeqCst);
        if let Some(stop) = lifecycle.stop.take() {
            stop.stop();
        }

        let state = self.state.read().clone();
        if let Some(state) = &state {
            state.tile_gate.wake_all();
            state.surfaces.lock().notify_all();
        }

        // Without `wait` the handles stay so a later close or drop can join.
        if wait {
            for daemon in lifecycle.daemons.iter_mut() {
                daemon.join();
            }
            lifecycle.daemons.clear();
        }

        if let Some(state) = self.state.write().take() {
            if let Err(e) = state.commit() {
                warn!(error = %e, "commit while closing failed");
            }
            if let Err(e) = state.store.close() {
                warn!(error = %e, "closing record store failed");
            }
        }
        if was_enabled {
            info!("cache closed");
        }
    }

    /// Renames every live artifact to `*.old` and purges the renamed paths
    /// in the background. When a rename fails the sentinel is written so
    /// the next open retries, and the restart notice runs.
    fn delete_files(&self, layout: &CacheLayout) -> DeleteOutcome {
        let mut failed = false;
        let mut renamed = Vec::new();
        for path in layout.live_artifacts() {
            if !path.exists() {
                continue;
            }
            let old = layout::old_path(&path);
            if let Err(e) = layout::remove_path(&old) {
                warn!(path = %old.display(), error = %e, "could not clear old artifact");
            }
            match fs::rename(&path, &old) {
                Ok(()) => renamed.push(old),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not rename for deletion");
                    failed = true;
                }
            }
        }

        let outcome = if failed {
            if let Err(e) = fs::write(layout.sentinel_path(), b"") {
                warn!(error = %e, "could not write delete sentinel");
            }
            let notice = self.restart_notice.read();
            (**notice)(layout.root());
            DeleteOutcome::Deferred
        } else {
            if let Err(e) = layout::remove_path(&layout.sentinel_path()) {
                warn!(error = %e, "could not remove delete sentinel");
            }
            DeleteOutcome::Removed
        };

        if !renamed.is_empty() {
            purge_async(renamed);
        }
        info!(cache_dir = %layout.root().display(), ?outcome, "cache deleted");
        outcome
    }

    /// Deletes the cache and reopens it empty. With `only_generation`
    /// set, does nothing unless that open is still the live one.
    fn recreate_if(self: &Arc<Self>, only_generation: Option<u64>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(generation) = only_generation {
            if !self.enabled.load(Ordering::SeqCst) || self.generation() != generation {
                debug!("recreate skipped, cache closed or reopened");
                return Ok(());
            }
        }
        let Some(root) = lifecycle.root.clone() else {
            return Err(CacheError::Closed);
        };
        error!(cache_dir = %root.display(), "recreating cache database");
        self.close_locked(&mut lifecycle, true);
        self.delete_files(&CacheLayout::new(&root));
        self.open_locked(&mut lifecycle, &root)
    }

    /// Recreates the cache on its own thread, unless the manager has been
    /// closed or reopened by the time that thread runs.
    pub fn spawn_recreate(self: &Arc<Self>) {
        let inner = self.clone();
        let generation = self.generation();
        let spawned = thread::Builder::new()
            .name("vgcache-recreate".to_string())
            .spawn(move || {
                if let Err(e) = inner.recreate_if(Some(generation)) {
                    error!(error = %e, "recreating cache database failed");
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "could not start recreate thread");
        }
    }
}
