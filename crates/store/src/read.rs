//! Read path: named roots, record blobs, index entries, on-disk size.
use crate::{
    decode_recid, entry_key, entry_prefix, name_key, record_key, RecId, RecordStore, Result,
    StoreError,
};

impl RecordStore {
    /// Looks up the recid bound to `name`.
    pub fn named_object(&self, name: &str) -> Result<Option<RecId>> {
        let inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(StoreError::Closed);
        }
        inner
            .table
            .get(&name_key(name))
            .map(|v| decode_recid(v))
            .transpose()
    }

    /// Returns a copy of the blob stored at `recid`.
    pub fn fetch_record(&self, recid: RecId) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(inner.table.get(&record_key(recid)).cloned())
    }

    /// Returns one entry of the index stored at `recid`.
    pub fn get_entry(&self, recid: RecId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(inner.table.get(&entry_key(recid, key)).cloned())
    }

    /// Snapshot of every entry owned by `recid`, with the namespace prefix
    /// stripped from the keys. Ordered by raw key bytes.
    pub fn entries(&self, recid: RecId) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(StoreError::Closed);
        }
        let prefix = entry_prefix(recid);
        Ok(inner
            .table
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_vec(), v.clone()))
            .collect())
    }

    /// Combined length of `cache.db` and `cache.lg` as currently on disk.
    pub fn size_on_disk(&self) -> u64 {
        let len = |p: &std::path::Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
        len(&self.db_path) + len(&self.log_path)
    }

    /// Number of live keys in the table, across all namespaces.
    pub fn table_len(&self) -> usize {
        self.inner.lock().table.len()
    }
}
