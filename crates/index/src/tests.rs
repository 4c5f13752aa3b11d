use super::*;
use anyhow::Result;
use codec::{ByteOrder, ElevationRecord, FileRecord, SizeFirst};
use std::sync::Arc;
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Arc<RecordStore> {
    Arc::new(RecordStore::open(dir, 64 * 1024 * 1024).unwrap())
}

type TickIndex = BTreeIndex<ByteOrder, i32>;

// --------------------- BTreeIndex ---------------------

#[test]
fn btree_insert_get_remove() -> Result<()> {
    let dir = tempdir()?;
    let idx = TickIndex::create(open(dir.path()))?;

    assert_eq!(idx.insert(b"b", &2)?, None);
    assert_eq!(idx.insert(b"a", &1)?, None);
    assert_eq!(idx.insert(b"b", &3)?, Some(2));
    assert_eq!(idx.get(b"b")?, Some(3));
    assert_eq!(idx.len(), 2);

    assert_eq!(idx.remove(b"a")?, Some(1));
    assert_eq!(idx.remove(b"a")?, None);
    assert_eq!(idx.len(), 1);
    Ok(())
}

#[test]
fn btree_next_after_browses_in_order() -> Result<()> {
    let dir = tempdir()?;
    let idx = TickIndex::create(open(dir.path()))?;
    for (i, k) in [b"c", b"a", b"d", b"b"].iter().enumerate() {
        idx.insert(*k, &(i as i32))?;
    }

    let mut seen = Vec::new();
    let mut cursor: Option<Vec<u8>> = None;
    while let Some((k, _)) = idx.next_after(cursor.as_deref())? {
        seen.push(k.clone());
        cursor = Some(k);
    }
    assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    Ok(())
}

#[test]
fn btree_browsing_survives_removal_of_cursor_key() -> Result<()> {
    let dir = tempdir()?;
    let idx = TickIndex::create(open(dir.path()))?;
    for k in [b"a", b"b", b"c"] {
        idx.insert(k, &0)?;
    }

    let (k, _) = idx.next_after(None)?.unwrap();
    idx.remove(&k)?;
    let (next, _) = idx.next_after(Some(k.as_slice()))?.unwrap();
    assert_eq!(next, b"b".to_vec());
    Ok(())
}

#[test]
fn btree_pop_first_drains_in_order() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path());
    let idx = TickIndex::create(store.clone())?;
    idx.insert(b"z", &26)?;
    idx.insert(b"m", &13)?;

    assert_eq!(idx.pop_first()?, Some((b"m".to_vec(), 13)));
    assert_eq!(idx.pop_first()?, Some((b"z".to_vec(), 26)));
    assert_eq!(idx.pop_first()?, None);
    assert!(store.entries(idx.recid())?.is_empty());
    Ok(())
}

#[test]
fn btree_reload_restores_entries() -> Result<()> {
    let dir = tempdir()?;
    let recid;
    {
        let store = open(dir.path());
        let idx = TickIndex::create(store.clone())?;
        recid = idx.recid();
        idx.insert(b"tile-1", &-5)?;
        idx.insert(b"tile-2", &i32::MAX)?;
        idx.remove(b"tile-1")?;
        store.close()?;
    }

    let idx = TickIndex::load(open(dir.path()), recid)?;
    assert_eq!(idx.len(), 1);
    assert_eq!(idx.get(b"tile-2")?, Some(i32::MAX));
    Ok(())
}

#[test]
fn btree_size_first_orders_short_keys_first() -> Result<()> {
    let dir = tempdir()?;
    let idx: BTreeIndex<SizeFirst, ElevationRecord> = BTreeIndex::create(open(dir.path()))?;
    let rec = ElevationRecord::new(100, 2, 7);
    idx.insert(&[0xFF], &rec)?;
    idx.insert(&[0x00, 0x00], &rec)?;
    idx.insert(&[0x01], &rec)?;

    let (first, _) = idx.first()?.unwrap();
    assert_eq!(first, vec![0x01]);
    let (second, _) = idx.next_after(Some(first.as_slice()))?.unwrap();
    assert_eq!(second, vec![0xFF]);
    let (third, _) = idx.next_after(Some(second.as_slice()))?.unwrap();
    assert_eq!(third, vec![0x00, 0x00]);
    Ok(())
}

#[test]
fn btree_descriptor_mismatch_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path());
    let idx = TickIndex::create(store.clone())?;

    let err = BTreeIndex::<SizeFirst, ElevationRecord>::load(store, idx.recid())
        .err()
        .unwrap();
    assert!(matches!(err, IndexError::Descriptor { .. }));
    assert!(err.is_corruption());
    Ok(())
}

#[test]
fn btree_load_missing_recid() -> Result<()> {
    let dir = tempdir()?;
    let err = TickIndex::load(open(dir.path()), 4242).err().unwrap();
    assert!(matches!(err, IndexError::Missing(4242)));
    Ok(())
}

#[test]
fn btree_undecodable_value_is_corruption() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path());
    let idx = TickIndex::create(store.clone())?;
    store.put_entry(idx.recid(), b"bad", b"xyz")?;

    let err = TickIndex::load(store, idx.recid()).err().unwrap();
    assert!(matches!(err, IndexError::Codec(_)));
    assert!(err.is_corruption());
    Ok(())
}

#[test]
fn btree_destroy_removes_everything() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path());
    let idx = TickIndex::create(store.clone())?;
    idx.insert(b"k", &1)?;

    idx.destroy()?;
    assert!(idx.is_empty());
    assert_eq!(store.fetch_record(idx.recid())?, None);
    assert!(store.entries(idx.recid())?.is_empty());
    Ok(())
}

#[test]
fn closed_store_errors_are_not_corruption() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path());
    let idx = TickIndex::create(store.clone())?;
    store.close()?;

    let err = idx.insert(b"k", &1).err().unwrap();
    assert!(matches!(err, IndexError::Store(StoreError::Closed)));
    assert!(!err.is_corruption());
    // the in-memory view is untouched by the failed write
    assert_eq!(idx.get(b"k")?, None);
    Ok(())
}

// --------------------- HTreeIndex ---------------------

#[test]
fn htree_put_get_remove_keys() -> Result<()> {
    let dir = tempdir()?;
    let idx: HTreeIndex<FileRecord> = HTreeIndex::create(open(dir.path()))?;

    let url = "http://example.com/a.bin";
    assert_eq!(idx.put(url, &FileRecord::new(1, 10))?, None);
    assert_eq!(
        idx.put(url, &FileRecord::new(1, 11))?,
        Some(FileRecord::new(1, 10))
    );
    idx.put("other", &FileRecord::new(2, 12))?;

    let mut keys = idx.keys();
    keys.sort();
    assert_eq!(keys, vec!["http://example.com/a.bin".to_string(), "other".to_string()]);

    assert_eq!(idx.remove(url)?, Some(FileRecord::new(1, 11)));
    assert_eq!(idx.get(url)?, None);
    assert_eq!(idx.len(), 1);
    Ok(())
}

#[test]
fn htree_reload_restores_entries() -> Result<()> {
    let dir = tempdir()?;
    let recid;
    {
        let store = open(dir.path());
        let idx: HTreeIndex<FileRecord> = HTreeIndex::create(store.clone())?;
        recid = idx.recid();
        idx.put("k1", &FileRecord::new(-3, 4))?;
        idx.put("k2", &FileRecord::new(5, 6))?;
        idx.remove("k2")?;
        store.close()?;
    }

    let idx: HTreeIndex<FileRecord> = HTreeIndex::load(open(dir.path()), recid)?;
    assert_eq!(idx.keys(), vec!["k1".to_string()]);
    assert_eq!(idx.get("k1")?, Some(FileRecord::new(-3, 4)));
    Ok(())
}

#[test]
fn htree_rejects_btree_descriptor() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path());
    let tree = TickIndex::create(store.clone())?;
    assert!(matches!(
        HTreeIndex::<FileRecord>::load(store, tree.recid()),
        Err(IndexError::Descriptor { .. })
    ));
    Ok(())
}
