use codec::{KeyComparator, ValueCodec};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Bound;
use std::sync::Arc;
use store::{RecId, RecordStore};

use crate::{check_descriptor, create_descriptor, OrderedIndex, Result};

/// Raw key ordered by `C`.
struct OrderedKey<C> {
    bytes: Vec<u8>,
    _cmp: PhantomData<fn() -> C>,
}

impl<C> OrderedKey<C> {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            _cmp: PhantomData,
        }
    }
}

impl<C: KeyComparator> PartialEq for OrderedKey<C> {
    fn eq(&self, other: &Self) -> bool {
        C::compare(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl<C: KeyComparator> Eq for OrderedKey<C> {}

impl<C: KeyComparator> PartialOrd for OrderedKey<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: KeyComparator> Ord for OrderedKey<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        C::compare(&self.bytes, &other.bytes)
    }
}

/// Ordered index with a pluggable comparator and value codec.
///
/// Entries are held in a `BTreeMap` keyed by the comparator's order and
/// written through to the store under the index's recid. Two keys the
/// comparator deems equal are the same entry; the most recent spelling is
/// the one persisted.
pub struct BTreeIndex<C: KeyComparator, V: ValueCodec> {
    store: Arc<RecordStore>,
    recid: RecId,
    map: RwLock<BTreeMap<OrderedKey<C>, V>>,
}

impl<C: KeyComparator, V: ValueCodec> BTreeIndex<C, V> {
    /// Type descriptor persisted with the index.
    pub fn descriptor() -> String {
        format!("btree|{}|{}", C::NAME, V::NAME)
    }

    /// Creates a new, empty index in `store`.
    pub fn create(store: Arc<RecordStore>) -> Result<Self> {
        let recid = create_descriptor(&store, &Self::descriptor())?;
        Ok(Self {
            store,
            recid,
            map: RwLock::new(BTreeMap::new()),
        })
    }

    /// Loads the index stored at `recid`.
    pub fn load(store: Arc<RecordStore>, recid: RecId) -> Result<Self> {
        check_descriptor(&store, recid, &Self::descriptor())?;
        let mut map = BTreeMap::new();
        for (k, v) in store.entries(recid)? {
            map.insert(OrderedKey::new(k), V::decode(&v)?);
        }
        Ok(Self {
            store,
            recid,
            map: RwLock::new(map),
        })
    }

    fn probe(key: &[u8]) -> OrderedKey<C> {
        OrderedKey::new(key.to_vec())
    }
}

impl<C: KeyComparator, V: ValueCodec> OrderedIndex<V> for BTreeIndex<C, V> {
    fn get(&self, key: &[u8]) -> Result<Option<V>> {
        Ok(self.map.read().get(&Self::probe(key)).cloned())
    }

    fn insert(&self, key: &[u8], value: &V) -> Result<Option<V>> {
        let mut map = self.map.write();
        let probe = Self::probe(key);
        if let Some((old_key, _)) = map.get_key_value(&probe) {
            if old_key.bytes != key {
                self.store.delete_entry(self.recid, &old_key.bytes)?;
            }
        }
        self.store.put_entry(self.recid, key, &value.encode())?;
        let previous = map.remove(&probe);
        map.insert(probe, value.clone());
        Ok(previous)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<V>> {
        let mut map = self.map.write();
        match map.remove_entry(&Self::probe(key)) {
            Some((stored, value)) => {
                if let Err(e) = self.store.delete_entry(self.recid, &stored.bytes) {
                    map.insert(stored, value);
                    return Err(e.into());
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn first(&self) -> Result<Option<(Vec<u8>, V)>> {
        Ok(self
            .map
            .read()
            .iter()
            .next()
            .map(|(k, v)| (k.bytes.clone(), v.clone())))
    }

    fn next_after(&self, key: Option<&[u8]>) -> Result<Option<(Vec<u8>, V)>> {
        let key = match key {
            Some(k) => k,
            None => return self.first(),
        };
        let map = self.map.read();
        Ok(map
            .range((Bound::Excluded(Self::probe(key)), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.bytes.clone(), v.clone())))
    }

    fn pop_first(&self) -> Result<Option<(Vec<u8>, V)>> {
        let mut map = self.map.write();
        match map.pop_first() {
            Some((k, v)) => {
                if let Err(e) = self.store.delete_entry(self.recid, &k.bytes) {
                    map.insert(k, v);
                    return Err(e.into());
                }
                Ok(Some((k.bytes, v)))
            }
            None => Ok(None),
        }
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn recid(&self) -> RecId {
        self.recid
    }

    fn destroy(&self) -> Result<()> {
        let mut map = self.map.write();
        self.store.delete_record(self.recid)?;
        map.clear();
        Ok(())
    }
}
