//! # Index - Store-Backed Ordered and Hash Indexes
//!
//! Two index shapes live on top of [`store::RecordStore`]:
//!
//! - [`OrderedIndex`]: byte keys in a comparator-defined order with
//!   successor browsing ([`OrderedIndex::next_after`]). Implemented by
//!   [`BTreeIndex`], generic over a [`codec::KeyComparator`] and a
//!   [`codec::ValueCodec`].
//! - [`HashIndex`]: string keys with unordered key iteration. Implemented by
//!   [`HTreeIndex`].
//!
//! Both are materialized in memory and write every mutation through to the
//! store, so a lookup never touches the store lock. Each index owns one
//! store record (its *descriptor*) whose entries are the index entries;
//! the descriptor names the comparator and value codec so that reopening an
//! index with the wrong types is caught.
//!
//! ## Lock order
//!
//! index lock → store lock. The store lock is never held while an index
//! lock is requested.

mod btree;
mod htree;

pub use btree::BTreeIndex;
pub use htree::HTreeIndex;

use codec::CodecError;
use store::{RecId, RecordStore, StoreError};
use thiserror::Error;

/// Errors raised by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The index at this recid was created with different key/value types.
    #[error("index descriptor mismatch: expected {expected:?}, found {found:?}")]
    Descriptor { expected: String, found: String },

    /// No descriptor record exists at this recid.
    #[error("no index stored at recid {0}")]
    Missing(RecId),
}

impl IndexError {
    /// Whether the error indicates damaged persistent state (as opposed to
    /// I/O trouble or a closed store).
    pub fn is_corruption(&self) -> bool {
        match self {
            IndexError::Store(StoreError::Corrupt(_)) => true,
            IndexError::Store(_) => false,
            IndexError::Codec(_) | IndexError::Descriptor { .. } | IndexError::Missing(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Ordered map from byte keys to `V`.
pub trait OrderedIndex<V>: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<V>>;

    /// Upserts `value`, returning the previous value.
    fn insert(&self, key: &[u8], value: &V) -> Result<Option<V>>;

    fn remove(&self, key: &[u8]) -> Result<Option<V>>;

    /// Smallest entry.
    fn first(&self) -> Result<Option<(Vec<u8>, V)>>;

    /// Smallest entry strictly greater than `key`; `None` starts from the
    /// beginning. Browsing with this is stable under concurrent removals.
    fn next_after(&self, key: Option<&[u8]>) -> Result<Option<(Vec<u8>, V)>>;

    /// Removes and returns the smallest entry.
    fn pop_first(&self) -> Result<Option<(Vec<u8>, V)>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store record holding this index.
    fn recid(&self) -> RecId;

    /// Deletes the index and every remaining entry from the store.
    fn destroy(&self) -> Result<()>;
}

/// Unordered map from string keys to `V`.
pub trait HashIndex<V>: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<V>>;

    /// Upserts `value`, returning the previous value.
    fn put(&self, key: &str, value: &V) -> Result<Option<V>>;

    fn remove(&self, key: &str) -> Result<Option<V>>;

    /// Snapshot of the current keys, in no particular order.
    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn recid(&self) -> RecId;
}

/// Creates a descriptor record and returns its recid.
pub(crate) fn create_descriptor(store: &RecordStore, descriptor: &str) -> Result<RecId> {
    Ok(store.insert_record(descriptor.as_bytes())?)
}

/// Verifies that the record at `recid` carries `expected`.
pub(crate) fn check_descriptor(store: &RecordStore, recid: RecId, expected: &str) -> Result<()> {
    let blob = store.fetch_record(recid)?.ok_or(IndexError::Missing(recid))?;
    if blob != expected.as_bytes() {
        return Err(IndexError::Descriptor {
            expected: expected.to_string(),
            found: String::from_utf8_lossy(&blob).into_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
