use super::helpers::*;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Records ---------------------

#[test]
fn insert_fetch_update_record() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());

    let a = store.insert_record(b"alpha")?;
    let b = store.insert_record(b"beta")?;
    assert_ne!(a, b);
    assert!(a >= FIRST_RECID);

    assert_eq!(store.fetch_record(a)?, Some(b"alpha".to_vec()));
    store.update_record(a, b"ALPHA")?;
    assert_eq!(store.fetch_record(a)?, Some(b"ALPHA".to_vec()));
    assert_eq!(store.fetch_record(b)?, Some(b"beta".to_vec()));
    assert_eq!(store.fetch_record(9999)?, None);
    Ok(())
}

#[test]
fn named_objects_bind_and_unbind() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());

    assert_eq!(store.named_object("Header")?, None);
    let id = store.insert_record(b"h")?;
    store.set_named_object("Header", id)?;
    assert_eq!(store.named_object("Header")?, Some(id));

    store.remove_named_object("Header")?;
    assert_eq!(store.named_object("Header")?, None);
    // removing twice is harmless
    store.remove_named_object("Header")?;
    Ok(())
}

// --------------------- Entries ---------------------

#[test]
fn entries_are_scoped_to_their_record() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());
    let a = store.insert_record(b"a")?;
    let b = store.insert_record(b"b")?;

    store.put_entry(a, b"k2", b"2")?;
    store.put_entry(a, b"k1", b"1")?;
    store.put_entry(b, b"k1", b"other")?;

    assert_eq!(store.get_entry(a, b"k1")?, Some(b"1".to_vec()));
    assert_eq!(store.get_entry(b, b"k1")?, Some(b"other".to_vec()));
    assert_eq!(
        store.entries(a)?,
        vec![
            (b"k1".to_vec(), b"1".to_vec()),
            (b"k2".to_vec(), b"2".to_vec())
        ]
    );

    assert!(store.delete_entry(a, b"k1")?);
    assert!(!store.delete_entry(a, b"k1")?);
    assert_eq!(store.entries(a)?.len(), 1);
    Ok(())
}

#[test]
fn empty_entry_key_is_allowed() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());
    let a = store.insert_record(b"a")?;

    store.put_entry(a, b"", b"root")?;
    assert_eq!(store.get_entry(a, b"")?, Some(b"root".to_vec()));
    assert_eq!(store.entries(a)?, vec![(Vec::new(), b"root".to_vec())]);
    Ok(())
}

#[test]
fn delete_record_drops_its_entries() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());
    let a = store.insert_record(b"a")?;
    let b = store.insert_record(b"b")?;
    for i in 0..10u8 {
        store.put_entry(a, &[i], &[i])?;
    }
    store.put_entry(b, b"keep", b"1")?;

    store.delete_record(a)?;
    assert_eq!(store.fetch_record(a)?, None);
    assert!(store.entries(a)?.is_empty());
    assert_eq!(store.entries(b)?.len(), 1);
    Ok(())
}

// --------------------- Commit / close ---------------------

#[test]
fn commit_flushes_log_without_checkpoint() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());
    store.insert_record(b"payload")?;

    let log = dir.path().join(LOG_FILE);
    assert_eq!(file_len(&log), 0);
    store.commit()?;
    assert!(file_len(&log) > 0);
    assert!(!dir.path().join(DB_FILE).exists());
    Ok(())
}

#[test]
fn commit_checkpoints_past_threshold() -> Result<()> {
    let dir = tempdir()?;
    let store = RecordStore::open(dir.path(), 64)?;
    let a = store.insert_record(&[7u8; 100])?;
    store.commit()?;

    assert!(dir.path().join(DB_FILE).exists());
    assert_eq!(file_len(&dir.path().join(LOG_FILE)), 0);
    assert_eq!(store.fetch_record(a)?, Some(vec![7u8; 100]));
    Ok(())
}

#[test]
fn close_is_idempotent_and_rejects_later_calls() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());
    let a = store.insert_record(b"x")?;

    store.close()?;
    store.close()?;
    assert!(store.is_closed());

    assert!(matches!(store.insert_record(b"y"), Err(StoreError::Closed)));
    assert!(matches!(store.fetch_record(a), Err(StoreError::Closed)));
    assert!(matches!(store.commit(), Err(StoreError::Closed)));
    assert!(matches!(store.delete_entry(a, b"k"), Err(StoreError::Closed)));
    Ok(())
}

#[test]
fn size_on_disk_counts_both_files() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());
    assert_eq!(store.size_on_disk(), 0);

    store.insert_record(&[1u8; 500])?;
    store.commit()?;
    let after_commit = store.size_on_disk();
    assert!(after_commit > 500);

    store.checkpoint_now()?;
    let db = file_len(&dir.path().join(DB_FILE));
    assert_eq!(store.size_on_disk(), db);
    Ok(())
}
