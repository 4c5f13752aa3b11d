use crate::RecordStore;
use std::path::Path;

/// Large enough that no test checkpoints by accident.
pub const NO_CHECKPOINT: u64 = 64 * 1024 * 1024;

pub fn open_store(dir: &Path) -> RecordStore {
    RecordStore::open(dir, NO_CHECKPOINT).unwrap()
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
