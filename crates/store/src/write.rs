//! Write path: record, named-root and entry mutations, `commit`, `close`.
//!
//! Every mutation is appended to the log before it is applied to the table.
use datafile::DataFileWriter;
use std::fs::OpenOptions;
use tracing::{debug, warn};
use wal::{WalRecord, WalWriter};

use crate::{
    entry_key, entry_prefix, name_key, record_key, RecId, RecordStore, Result, StoreError,
    StoreInner, META_NEXT_RECID,
};

impl StoreInner {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let log = self.log.as_mut().ok_or(StoreError::Closed)?;
        log.append(&WalRecord::Put {
            key: key.clone(),
            value: value.clone(),
        })?;
        self.table.insert(key, value);
        Ok(())
    }

    fn del(&mut self, key: Vec<u8>) -> Result<bool> {
        if !self.table.contains_key(&key) {
            // Still reject writes to a closed store.
            return match self.log {
                Some(_) => Ok(false),
                None => Err(StoreError::Closed),
            };
        }
        let log = self.log.as_mut().ok_or(StoreError::Closed)?;
        log.append(&WalRecord::Del { key: key.clone() })?;
        self.table.remove(&key);
        Ok(true)
    }

    /// Keys in `[prefix, prefix+1)`.
    pub(crate) fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.table
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl RecordStore {
    /// Stores `blob` under a freshly allocated recid.
    pub fn insert_record(&self, blob: &[u8]) -> Result<RecId> {
        let mut inner = self.inner.lock();
        let recid = inner.next_recid;
        let next = recid
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupt("recid space exhausted".into()))?;
        inner.put(META_NEXT_RECID.to_vec(), next.to_be_bytes().to_vec())?;
        inner.next_recid = next;
        inner.put(record_key(recid), blob.to_vec())?;
        Ok(recid)
    }

    /// Overwrites the blob of an existing record.
    pub fn update_record(&self, recid: RecId, blob: &[u8]) -> Result<()> {
        self.inner.lock().put(record_key(recid), blob.to_vec())
    }

    /// Deletes a record together with every entry it owns.
    pub fn delete_record(&self, recid: RecId) -> Result<()> {
        let mut inner = self.inner.lock();
        for key in inner.keys_with_prefix(&entry_prefix(recid)) {
            inner.del(key)?;
        }
        inner.del(record_key(recid))?;
        Ok(())
    }

    /// Binds `name` to `recid` so it can be found again after a reopen.
    pub fn set_named_object(&self, name: &str, recid: RecId) -> Result<()> {
        self.inner
            .lock()
            .put(name_key(name), recid.to_be_bytes().to_vec())
    }

    pub fn remove_named_object(&self, name: &str) -> Result<()> {
        self.inner.lock().del(name_key(name)).map(|_| ())
    }

    /// Upserts one entry of the index stored at `recid`.
    pub fn put_entry(&self, recid: RecId, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .put(entry_key(recid, key), value.to_vec())
    }

    /// Removes one entry; returns whether it existed.
    pub fn delete_entry(&self, recid: RecId, key: &[u8]) -> Result<bool> {
        self.inner.lock().del(entry_key(recid, key))
    }

    /// Pushes buffered log frames to the OS and checkpoints when the log has
    /// outgrown its threshold.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let log = inner.log.as_mut().ok_or(StoreError::Closed)?;
        log.flush()?;
        if log.len() >= self.checkpoint_bytes {
            self.checkpoint(&mut inner)?;
        }
        Ok(())
    }

    /// Forces a checkpoint regardless of the log size.
    pub fn checkpoint_now(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(StoreError::Closed);
        }
        self.checkpoint(&mut inner)
    }

    /// Rewrites `cache.db` from the table and truncates the log.
    ///
    /// # Steps
    ///
    /// 1. Flush pending log frames (replay stays correct if step 2 fails).
    /// 2. Write the checkpoint atomically (temp file + rename).
    /// 3. Truncate the log to zero bytes and reopen it.
    fn checkpoint(&self, inner: &mut StoreInner) -> Result<()> {
        if let Some(log) = inner.log.as_mut() {
            log.flush()?;
        }

        let count = DataFileWriter::write_from_iter(
            &self.db_path,
            inner
                .table
                .iter()
                .map(|(k, v)| (k.as_slice(), v.as_slice())),
        )?;

        // Drop the old writer before truncating so no stale buffer survives.
        inner.log = None;
        let truncated = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)?;
        truncated.sync_all()?;
        drop(truncated);
        inner.log = Some(WalWriter::create(&self.log_path)?);

        debug!(entries = count, path = %self.db_path.display(), "store checkpointed");
        Ok(())
    }

    /// Commits, checkpoints and fsyncs, then releases the table.
    ///
    /// Idempotent: closing a closed store is `Ok(())`. Any later operation
    /// fails with [`StoreError::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.log.is_none() {
            return Ok(());
        }
        let result = self.checkpoint(&mut inner).and_then(|_| {
            match inner.log.as_mut() {
                Some(log) => log.sync_to_disk().map_err(StoreError::from),
                None => Ok(()),
            }
        });
        if let Err(e) = &result {
            warn!(error = %e, dir = %self.dir.display(), "error while closing record store");
        }
        inner.log = None;
        inner.table.clear();
        result
    }
}
