//! # Store - Embedded Record Manager
//!
//! The single persistent object store behind a cache directory. Every index,
//! registry and header the cache keeps lives in one sorted in-memory table
//! that is rebuilt on open from two files:
//!
//! ```text
//! <root>/cache.db   checkpoint of the whole table   (crate `datafile`)
//! <root>/cache.lg   mutations since that checkpoint (crate `wal`)
//! ```
//!
//! ## Key namespaces
//!
//! | Prefix | Layout                                | Holds                    |
//! |--------|---------------------------------------|--------------------------|
//! | `N`    | `N` + root name                       | recid of a named root    |
//! | `R`    | `R` + recid (u64 BE)                  | a record blob            |
//! | `I`    | `I` + recid (u64 BE) + entry key      | one entry of an index    |
//! | `M`    | `M:next_recid`                        | record id allocator      |
//!
//! Index entries are keyed under their owning record so that an index can be
//! enumerated with a single prefix range and dropped with its record.
//!
//! ## Durability
//!
//! Transactions are disabled: mutations are appended to a buffered log and
//! [`RecordStore::commit`] only pushes that buffer to the OS. When the log
//! outgrows the checkpoint threshold the table is rewritten to `cache.db`
//! and the log is truncated. [`RecordStore::close`] always checkpoints and
//! fsyncs.
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `lib.rs`     | `RecordStore`, key layout, errors, `Debug`, `Drop`   |
//! | `recovery`   | checkpoint load, log replay, tmp file cleanup        |
//! | `write`      | record/root/entry mutations, `commit`, `close`       |
//! | `read`       | lookups, entry enumeration, on-disk size             |

mod read;
mod recovery;
mod write;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wal::WalWriter;

/// Identifier of a record inside the store. Never reused.
pub type RecId = u64;

/// Checkpoint file name.
pub const DB_FILE: &str = "cache.db";
/// Mutation log file name.
pub const LOG_FILE: &str = "cache.lg";

const NAME_PREFIX: u8 = b'N';
const RECORD_PREFIX: u8 = b'R';
const ENTRY_PREFIX: u8 = b'I';
const META_NEXT_RECID: &[u8] = b"M:next_recid";

/// First recid handed out by a fresh store. Zero is never a valid id.
const FIRST_RECID: RecId = 1;

/// Errors surfaced by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The checkpoint or the log failed validation, or the table holds
    /// bytes that do not decode.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl From<wal::WalError> for StoreError {
    fn from(e: wal::WalError) -> Self {
        match e {
            wal::WalError::Io(e) => StoreError::Io(e),
            wal::WalError::Corrupt { offset } => {
                StoreError::Corrupt(format!("mutation log frame at byte {offset}"))
            }
        }
    }
}

impl From<datafile::DataFileError> for StoreError {
    fn from(e: datafile::DataFileError) -> Self {
        match e {
            datafile::DataFileError::Io(e) => StoreError::Io(e),
            datafile::DataFileError::Corrupt(msg) => StoreError::Corrupt(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The embedded record manager.
///
/// All methods take `&self`; a single internal mutex serializes access to
/// the table and the log. Callers must not hold this lock while taking any
/// of their own locks, so it is always the innermost one.
pub struct RecordStore {
    pub(crate) dir: PathBuf,
    pub(crate) db_path: PathBuf,
    pub(crate) log_path: PathBuf,
    /// Log size that makes `commit` rewrite the checkpoint.
    pub(crate) checkpoint_bytes: u64,
    pub(crate) inner: Mutex<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) table: BTreeMap<Vec<u8>, Vec<u8>>,
    /// `None` once the store is closed.
    pub(crate) log: Option<WalWriter>,
    pub(crate) next_recid: RecId,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RecordStore")
            .field("dir", &self.dir)
            .field("checkpoint_bytes", &self.checkpoint_bytes)
            .field("table_entries", &inner.table.len())
            .field("log_len", &inner.log.as_ref().map(|l| l.len()))
            .field("next_recid", &inner.next_recid)
            .finish()
    }
}

impl RecordStore {
    /// Directory holding `cache.db` and `cache.lg`.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns `true` after [`RecordStore::close`].
    pub fn is_closed(&self) -> bool {
        self.inner.lock().log.is_none()
    }
}

/// Best-effort close on drop. Errors are ignored; the log still holds every
/// flushed mutation and is replayed on the next open.
impl Drop for RecordStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

pub(crate) fn name_key(name: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + name.len());
    k.push(NAME_PREFIX);
    k.extend_from_slice(name.as_bytes());
    k
}

pub(crate) fn record_key(recid: RecId) -> Vec<u8> {
    let mut k = Vec::with_capacity(9);
    k.push(RECORD_PREFIX);
    k.extend_from_slice(&recid.to_be_bytes());
    k
}

/// Prefix shared by every entry owned by `recid`.
pub(crate) fn entry_prefix(recid: RecId) -> Vec<u8> {
    let mut k = Vec::with_capacity(9);
    k.push(ENTRY_PREFIX);
    k.extend_from_slice(&recid.to_be_bytes());
    k
}

pub(crate) fn entry_key(recid: RecId, key: &[u8]) -> Vec<u8> {
    let mut k = entry_prefix(recid);
    k.extend_from_slice(key);
    k
}

pub(crate) fn decode_recid(buf: &[u8]) -> Result<RecId> {
    let bytes: [u8; 8] = buf
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("recid of {} bytes", buf.len())))?;
    Ok(RecId::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests;
