//! URL-backed files: conditional fetch with a local copy as fallback.

use codec::FileRecord;
use index::HashIndex;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::Result;
use crate::fetch::FetchOutcome;
use crate::layout;
use crate::manager::{CacheManager, ManagerInner};
use crate::state::OpenState;

/// Distinguishes concurrent downloads of the same URL.
static DOWNLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Byte stream returned by [`CacheManager::input_stream`].
pub type InputStream = Box<dyn Read + Send>;

impl CacheManager {
    /// Opens `url` through the cache.
    ///
    /// The server is asked for a body newer than the local copy. A fresh
    /// body replaces the local copy and is streamed from disk; otherwise the
    /// local copy is returned if there is one. Network errors only show up
    /// as a missing result. While the manager is closed a fresh body is
    /// passed through uncached.
    pub fn input_stream(&self, url: &str) -> Option<InputStream> {
        self.inner.input_stream(url)
    }

    /// Forgets `url` and deletes its local copy.
    pub fn delete_file(&self, url: &str) {
        self.inner.delete_file(url)
    }
}

/// Writes `body` next to `path` and renames it into place.
fn store_body(path: &Path, body: &mut dyn Read) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".{}{}",
        DOWNLOAD_SEQ.fetch_add(1, Ordering::Relaxed),
        layout::PARTIAL_SUFFIX
    ));
    let tmp = PathBuf::from(tmp);

    let written = (|| {
        let mut out = BufWriter::new(File::create(&tmp)?);
        io::copy(body, &mut out)?;
        out.flush()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    File::open(path)
}

impl ManagerInner {
    pub(crate) fn input_stream(&self, url: &str) -> Option<InputStream> {
        let Some(state) = self.live_state() else {
            return match self.fetcher.fetch(url, None) {
                Ok(FetchOutcome::Fresh(body)) => Some(body),
                Ok(FetchOutcome::NotModified) => None,
                Err(e) => {
                    debug!(url, error = %e, "uncached fetch failed");
                    None
                }
            };
        };

        let path = match self.file_for(&state, url) {
            Ok(path) => path,
            Err(e) => {
                self.report(&e, "file lookup");
                return None;
            }
        };

        let local_modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
        match self.fetcher.fetch(url, local_modified) {
            Ok(FetchOutcome::Fresh(mut body)) => match store_body(&path, &mut body) {
                Ok(file) => return Some(Box::new(file)),
                Err(e) => warn!(url, error = %e, "could not store fetched body"),
            },
            Ok(FetchOutcome::NotModified) => {}
            Err(e) => debug!(url, error = %e, "fetch failed, trying local copy"),
        }

        match File::open(&path) {
            Ok(file) => Some(Box::new(file)),
            Err(_) => None,
        }
    }

    /// Stamps (or creates) the file index entry for `url` and returns the
    /// path of its local copy.
    fn file_for(&self, state: &OpenState, url: &str) -> Result<PathBuf> {
        let record = {
            let _files = state.file_lock.lock();
            let tick = state.clock.new_ts();
            let file_id = match state.file_index.get(url)? {
                Some(existing) => existing.file_id,
                None => state.clock.new_file_id(),
            };
            let record = FileRecord::new(file_id, tick);
            state.file_index.put(url, &record)?;
            record
        };
        state.commit()?;
        Ok(state.layout.file_path(record.file_id))
    }

    pub(crate) fn delete_file(&self, url: &str) {
        let Some(state) = self.live_state() else {
            return;
        };
        let removed = {
            let _files = state.file_lock.lock();
            state.file_index.remove(url)
        };
        match removed {
            Ok(Some(record)) => {
                let path = state.layout.file_path(record.file_id);
                if let Err(e) = layout::discard_file(&path) {
                    warn!(url, path = %path.display(), error = %e, "could not delete cached file");
                }
                if let Err(e) = state.commit() {
                    self.report(&e, "commit after file delete");
                }
            }
            Ok(None) => {}
            Err(e) => self.report(&e.into(), "file delete"),
        }
    }
}
