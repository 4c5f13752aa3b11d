//! Bounded cache of materialized elevation indexes.
//!
//! The LRU holds the hot surfaces. Indexes evicted from it stay reachable
//! through a weak map for as long as someone still holds them, so a surface
//! never has two diverging in-memory copies at once.

use index::OrderedIndex;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use store::RecId;

use crate::model::ElevationIndex;

pub(crate) struct SurfaceIndexCache {
    lru: LruCache<RecId, Arc<ElevationIndex>>,
    live: HashMap<RecId, Weak<ElevationIndex>>,
}

impl SurfaceIndexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            live: HashMap::new(),
        }
    }

    pub fn get(&mut self, recid: RecId) -> Option<Arc<ElevationIndex>> {
        if let Some(index) = self.lru.get(&recid) {
            return Some(index.clone());
        }
        let index = self.live.get(&recid)?.upgrade()?;
        self.lru.put(recid, index.clone());
        Some(index)
    }

    pub fn insert(&mut self, index: Arc<ElevationIndex>) {
        let recid = index.recid();
        self.live.retain(|_, w| w.strong_count() > 0);
        self.live.insert(recid, Arc::downgrade(&index));
        self.lru.put(recid, index);
    }

    /// Forgets `recid`, returning the index if it is still materialized.
    pub fn remove(&mut self, recid: RecId) -> Option<Arc<ElevationIndex>> {
        let strong = self.lru.pop(&recid);
        let weak = self.live.remove(&recid).and_then(|w| w.upgrade());
        strong.or(weak)
    }

    /// Number of indexes pinned by the LRU.
    pub fn len(&self) -> usize {
        self.lru.len()
    }
}
