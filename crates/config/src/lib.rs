//! # Config - Cache Tunables
//!
//! Every knob the cache engine exposes lives in [`CacheConfig`]. Values are
//! plain data with sensible defaults; the shell (and any embedding
//! application) may override them from the environment via
//! [`CacheConfig::from_env`].
//!
//! ```text
//! VGCACHE_MAX_SIZE_MB         size budget in MiB            (default: 512)
//! VGCACHE_BUCKETS             histogram bucket count        (default: 10000)
//! VGCACHE_STARTUP_DELAY_MS    GC startup delay              (default: 30000)
//! VGCACHE_IDLE_MS             GC idle backoff               (default: 5000)
//! VGCACHE_TILE_SLICE_MS       tile index slice length       (default: 10)
//! VGCACHE_ELEVATION_SLICE_MS  elevation browse burst length (default: 30)
//! VGCACHE_MAX_BAD_ENTRIES     corruption events before rebuild (default: 20)
//! VGCACHE_SURFACE_CACHE       cached elevation indexes      (default: 16)
//! VGCACHE_CHECKPOINT_KB       log size that triggers a checkpoint (default: 4096)
//! VGCACHE_FETCH_TIMEOUT_SECS  network fetch timeout         (default: 30)
//! ```
//!
//! Unparseable values silently fall back to the default.

use std::time::Duration;

/// Default size budget: 512 MiB.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 512 * 1024 * 1024;
/// Default number of equal-width buckets in the size/age histogram.
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 10_000;
/// Corruption events tolerated before the store is rebuilt.
pub const DEFAULT_MAX_BAD_ENTRIES: u32 = 20;
/// Default number of elevation indexes kept materialized in memory.
pub const DEFAULT_SURFACE_CACHE_CAPACITY: usize = 16;
/// Default log size (4 MiB) after which `commit` checkpoints the store.
pub const DEFAULT_LOG_CHECKPOINT_BYTES: u64 = 4 * 1024 * 1024;

/// Runtime configuration of a cache manager and its garbage collectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Target upper bound for resident bytes (tiles + files + store).
    pub max_cache_size: u64,
    /// Number of buckets spanning `[gc_cutoff_tick, tick]`.
    pub histogram_buckets: usize,
    /// Delay before either collector starts its first pass.
    pub startup_delay: Duration,
    /// Sleep between passes while the cache is under budget.
    pub idle_backoff: Duration,
    /// Maximum time the Tile GC holds the tile gate per slice.
    pub tile_slice: Duration,
    /// Maximum time the Elevation GC browses one surface per burst.
    pub elevation_slice: Duration,
    /// Corruption events tolerated before the store is recreated.
    pub max_bad_entries: u32,
    /// Capacity of the LRU holding materialized elevation indexes.
    pub surface_cache_capacity: usize,
    /// Log size that makes `commit` rewrite the data file.
    pub log_checkpoint_bytes: u64,
    /// Timeout for a single network fetch.
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS,
            startup_delay: Duration::from_secs(30),
            idle_backoff: Duration::from_secs(5),
            tile_slice: Duration::from_millis(10),
            elevation_slice: Duration::from_millis(30),
            max_bad_entries: DEFAULT_MAX_BAD_ENTRIES,
            surface_cache_capacity: DEFAULT_SURFACE_CACHE_CAPACITY,
            log_checkpoint_bytes: DEFAULT_LOG_CHECKPOINT_BYTES,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Reads an environment variable and parses it, falling back to `default`.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl CacheConfig {
    /// Builds a configuration from `VGCACHE_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_cache_size: env_or("VGCACHE_MAX_SIZE_MB", d.max_cache_size / (1024 * 1024))
                * 1024
                * 1024,
            histogram_buckets: env_or("VGCACHE_BUCKETS", d.histogram_buckets).max(1),
            startup_delay: Duration::from_millis(env_or(
                "VGCACHE_STARTUP_DELAY_MS",
                d.startup_delay.as_millis() as u64,
            )),
            idle_backoff: Duration::from_millis(env_or(
                "VGCACHE_IDLE_MS",
                d.idle_backoff.as_millis() as u64,
            )),
            tile_slice: Duration::from_millis(env_or(
                "VGCACHE_TILE_SLICE_MS",
                d.tile_slice.as_millis() as u64,
            )),
            elevation_slice: Duration::from_millis(env_or(
                "VGCACHE_ELEVATION_SLICE_MS",
                d.elevation_slice.as_millis() as u64,
            )),
            max_bad_entries: env_or("VGCACHE_MAX_BAD_ENTRIES", d.max_bad_entries),
            surface_cache_capacity: env_or("VGCACHE_SURFACE_CACHE", d.surface_cache_capacity)
                .max(1),
            log_checkpoint_bytes: env_or("VGCACHE_CHECKPOINT_KB", d.log_checkpoint_bytes / 1024)
                * 1024,
            fetch_timeout: Duration::from_secs(env_or(
                "VGCACHE_FETCH_TIMEOUT_SECS",
                d.fetch_timeout.as_secs(),
            )),
        }
    }

    /// Sets the size budget in bytes.
    pub fn with_max_cache_size(mut self, bytes: u64) -> Self {
        self.max_cache_size = bytes;
        self
    }

    /// Sets the histogram bucket count (at least one).
    pub fn with_histogram_buckets(mut self, buckets: usize) -> Self {
        self.histogram_buckets = buckets.max(1);
        self
    }

    /// Sets the collectors' startup delay.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Sets the collectors' idle backoff.
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Sets the bad-entry threshold.
    pub fn with_max_bad_entries(mut self, max: u32) -> Self {
        self.max_bad_entries = max;
        self
    }

    /// Sets how many elevation indexes stay materialized.
    pub fn with_surface_cache_capacity(mut self, capacity: usize) -> Self {
        self.surface_cache_capacity = capacity.max(1);
        self
    }

    /// Sets the log checkpoint threshold in bytes.
    pub fn with_log_checkpoint_bytes(mut self, bytes: u64) -> Self {
        self.log_checkpoint_bytes = bytes;
        self
    }

    /// Sets the network fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}
