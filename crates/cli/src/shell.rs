//! Command interpreter behind the `vgcache` prompt.
//!
//! One line in, one reply out. Replies are plain text so scripted sessions
//! can grep for `OK`, `(nil)` and `ERR`.

use cache::{CacheManager, DeleteOutcome, ElevationCache, GcReport, ModelParams};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

/// Model version used for surfaces the shell creates.
const SHELL_MODEL_VERSION: i32 = 1;

pub enum Reply {
    Text(String),
    Exit,
}

fn text(s: impl Into<String>) -> Reply {
    Reply::Text(s.into())
}

/// Decodes a hex string such as `0a1b` into bytes.
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

fn format_gc(report: &GcReport) -> String {
    let t = &report.tiles;
    let e = &report.elevations;
    format!(
        "tiles_evicted={} orphans_removed={} files_evicted={} samples_evicted={} \
         surfaces_dropped={} indexes_drained={} total_size={} cutoff={}",
        t.tiles_evicted,
        t.orphans_removed,
        t.files_evicted,
        e.samples_evicted,
        e.surfaces_dropped,
        e.indexes_drained,
        t.total_size,
        t.cutoff
    )
}

pub struct Shell {
    manager: CacheManager,
    dir: PathBuf,
    /// Writable handles created by `ESET`, reused across commands.
    surfaces: HashMap<String, ElevationCache>,
}

impl Shell {
    pub fn new(manager: CacheManager, dir: PathBuf) -> Self {
        Self {
            manager,
            dir,
            surfaces: HashMap::new(),
        }
    }

    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    fn writable(&mut self, name: &str) -> &ElevationCache {
        let manager = &self.manager;
        self.surfaces.entry(name.to_string()).or_insert_with(|| {
            manager.elevation_cache(name, Some(ModelParams::new(SHELL_MODEL_VERSION)))
        })
    }

    pub fn execute(&mut self, line: &str) -> Option<Reply> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next()?;
        let args: Vec<&str> = parts.collect();

        let reply = match (cmd.to_uppercase().as_str(), args.as_slice()) {
            ("TILE", [pyramid, pos, rest @ ..]) if rest.len() <= 1 => {
                let suffix = rest.first().copied().unwrap_or("");
                match self.manager.tile_cache_file(pyramid, pos, suffix) {
                    Some(path) => text(path.display().to_string()),
                    None => text("(nil)"),
                }
            }
            ("TILE", _) => text("ERR usage: TILE pyramid pos [suffix]"),

            ("ESET", [surface, key, h, dh]) => {
                let (Some(key), Ok(h), Ok(dh)) =
                    (parse_hex(key), h.parse::<i32>(), dh.parse::<i32>())
                else {
                    return Some(text("ERR usage: ESET surface key_hex h dh"));
                };
                if self.writable(surface).set(&key, h, dh) {
                    text("OK")
                } else {
                    text("ERR set failed")
                }
            }
            ("ESET", _) => text("ERR usage: ESET surface key_hex h dh"),

            ("EGET", [surface, key]) => {
                let Some(key) = parse_hex(key) else {
                    return Some(text("ERR usage: EGET surface key_hex"));
                };
                let sample = match self.surfaces.get(*surface) {
                    Some(handle) => handle.get(&key),
                    None => self.manager.elevation_cache(surface, None).get(&key),
                };
                match sample {
                    Some(s) => text(format!("{} {} {}", s.height, s.delta_height, s.tick)),
                    None => text("(nil)"),
                }
            }
            ("EGET", _) => text("ERR usage: EGET surface key_hex"),

            ("FETCH", [url]) => match self.manager.input_stream(url) {
                Some(mut stream) => {
                    let mut body = Vec::new();
                    match stream.read_to_end(&mut body) {
                        Ok(n) => text(format!("{n} bytes")),
                        Err(e) => text(format!("ERR read failed: {e}")),
                    }
                }
                None => text("(nil)"),
            },
            ("FETCH", _) => text("ERR usage: FETCH url"),

            ("DELFILE", [url]) => {
                self.manager.delete_file(url);
                text("OK")
            }
            ("DELFILE", _) => text("ERR usage: DELFILE url"),

            ("TS", []) => match self.manager.ts() {
                Some(t) => text(t.to_string()),
                None => text("ERR cache closed"),
            },
            ("NEWTS", []) => match self.manager.new_ts() {
                Some(t) => text(t.to_string()),
                None => text("ERR cache closed"),
            },
            ("GC", []) => match self.manager.run_gc_pass() {
                Some(report) => text(format_gc(&report)),
                None => text("ERR cache closed"),
            },
            ("STATS", []) => match self.manager.stats() {
                Some(s) => text(format!(
                    "tick={} cutoff={} total_size={} store_bytes={} tiles={} files={} \
                     pyramids={} surfaces={} pending_deletions={} bad_entries={}",
                    s.tick,
                    s.gc_cutoff,
                    s.total_size,
                    s.store_bytes,
                    s.tiles,
                    s.files,
                    s.pyramids,
                    s.surfaces,
                    s.pending_deletions,
                    s.bad_entries
                )),
                None => text("ERR cache closed"),
            },
            ("COMMIT", []) => match self.manager.commit() {
                Ok(()) => text("OK"),
                Err(e) => text(format!("ERR commit failed: {e}")),
            },
            ("DELETE", []) => {
                let outcome = self.manager.delete();
                self.surfaces.clear();
                let reopened = self.manager.open(&self.dir);
                match (outcome, reopened) {
                    (DeleteOutcome::Removed, Ok(())) => text("OK"),
                    (DeleteOutcome::Deferred, Ok(())) => text("OK (deferred until restart)"),
                    (_, Err(e)) => text(format!("ERR reopen failed: {e}")),
                }
            }
            ("EXIT" | "QUIT", _) => Reply::Exit,
            (other, _) => text(format!("ERR unknown command: {other}")),
        };
        Some(reply)
    }
}
