//! Cold-start path: load the checkpoint, replay the log on top of it and
//! reopen the log for appending.
use datafile::{DataFileReader, DataFileWriter};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use wal::{WalReader, WalRecord, WalWriter};

use crate::{
    decode_recid, RecId, RecordStore, Result, StoreInner, DB_FILE, FIRST_RECID, LOG_FILE,
    META_NEXT_RECID,
};

/// Replays the log at `path` into `table`, returning the number of records
/// applied. A missing log is a fresh start.
///
/// A torn final frame (a crash between buffered appends) is cut off so that
/// later appends land directly behind the last intact frame.
pub fn replay_log_into(path: &Path, table: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> Result<u64> {
    let mut reader = match WalReader::open(path) {
        Ok(r) => r,
        Err(wal::WalError::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let replay = reader.replay(|r| match r {
        WalRecord::Put { key, value } => {
            table.insert(key, value);
        }
        WalRecord::Del { key } => {
            table.remove(&key);
        }
    })?;

    if replay.torn_tail {
        warn!(
            path = %path.display(),
            valid_len = replay.valid_len,
            "truncating torn log tail"
        );
        OpenOptions::new()
            .write(true)
            .open(path)?
            .set_len(replay.valid_len)?;
    }
    Ok(replay.records)
}

impl RecordStore {
    /// Opens (or creates) the store inside `dir`.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create `dir` if it does not exist.
    /// 2. Remove a leftover `cache.db.tmp` from an interrupted checkpoint.
    /// 3. Load `cache.db` (empty table when absent).
    /// 4. Replay `cache.lg` on top of it.
    /// 5. Restore the recid allocator and reopen the log in append mode.
    pub fn open<P: AsRef<Path>>(dir: P, checkpoint_bytes: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let db_path = dir.join(DB_FILE);
        let log_path = dir.join(LOG_FILE);

        let tmp = DataFileWriter::tmp_path(&db_path);
        if tmp.exists() {
            let _ = std::fs::remove_file(&tmp);
        }

        let mut table = DataFileReader::load(&db_path)?;
        let loaded = table.len();
        let replayed = replay_log_into(&log_path, &mut table)?;

        let next_recid: RecId = match table.get(META_NEXT_RECID) {
            Some(v) => decode_recid(v)?,
            None => FIRST_RECID,
        };

        let log = WalWriter::create(&log_path)?;

        debug!(
            dir = %dir.display(),
            loaded,
            replayed,
            next_recid,
            "record store opened"
        );

        Ok(Self {
            dir,
            db_path,
            log_path,
            checkpoint_bytes,
            inner: Mutex::new(StoreInner {
                table,
                log: Some(log),
                next_recid,
            }),
        })
    }
}
