use codec::{CodecError, ValueCodec};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use store::{RecId, RecordStore};

use crate::{check_descriptor, create_descriptor, HashIndex, Result};

/// String-keyed hash index.
///
/// Uses `DashMap` so concurrent lookups of different keys do not contend.
/// Writes hold the key's shard lock across the store write.
pub struct HTreeIndex<V: ValueCodec> {
    store: Arc<RecordStore>,
    recid: RecId,
    map: DashMap<String, V>,
}

impl<V: ValueCodec> HTreeIndex<V> {
    pub fn descriptor() -> String {
        format!("htree|{}", V::NAME)
    }

    pub fn create(store: Arc<RecordStore>) -> Result<Self> {
        let recid = create_descriptor(&store, &Self::descriptor())?;
        Ok(Self {
            store,
            recid,
            map: DashMap::new(),
        })
    }

    pub fn load(store: Arc<RecordStore>, recid: RecId) -> Result<Self> {
        check_descriptor(&store, recid, &Self::descriptor())?;
        let map = DashMap::new();
        for (k, v) in store.entries(recid)? {
            let key = String::from_utf8(k).map_err(|_| CodecError::InvalidUtf8)?;
            map.insert(key, V::decode(&v)?);
        }
        Ok(Self { store, recid, map })
    }
}

impl<V: ValueCodec> HashIndex<V> for HTreeIndex<V> {
    fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.map.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &V) -> Result<Option<V>> {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                self.store
                    .put_entry(self.recid, key.as_bytes(), &value.encode())?;
                Ok(Some(e.insert(value.clone())))
            }
            Entry::Vacant(e) => {
                self.store
                    .put_entry(self.recid, key.as_bytes(), &value.encode())?;
                e.insert(value.clone());
                Ok(None)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(e) => {
                self.store.delete_entry(self.recid, key.as_bytes())?;
                Ok(Some(e.remove()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    fn keys(&self) -> Vec<String> {
        self.map.iter().map(|e| e.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn recid(&self) -> RecId {
        self.recid
    }
}
