use super::*;
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

fn sample() -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut m = BTreeMap::new();
    m.insert(b"apple".to_vec(), b"red".to_vec());
    m.insert(b"banana".to_vec(), b"yellow".to_vec());
    m.insert(vec![0x00, 0xFF], Vec::new());
    m
}

fn write_map(path: &std::path::Path, m: &BTreeMap<Vec<u8>, Vec<u8>>) -> u64 {
    DataFileWriter::write_from_iter(path, m.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
        .unwrap()
}

#[test]
fn write_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let m = sample();

    assert_eq!(write_map(&path, &m), 3);
    assert_eq!(DataFileReader::load(&path).unwrap(), m);
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempdir().unwrap();
    let loaded = DataFileReader::load(&dir.path().join("cache.db")).unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn empty_file_has_header_and_footer_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");

    assert_eq!(write_map(&path, &BTreeMap::new()), 0);
    assert_eq!(
        fs::metadata(&path).unwrap().len(),
        HEADER_BYTES + FOOTER_BYTES
    );
    assert!(DataFileReader::load(&path).unwrap().is_empty());
}

#[test]
fn rewrite_replaces_previous_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    write_map(&path, &sample());

    let mut next = BTreeMap::new();
    next.insert(b"only".to_vec(), b"one".to_vec());
    write_map(&path, &next);

    assert_eq!(DataFileReader::load(&path).unwrap(), next);
    assert!(!DataFileWriter::tmp_path(&path).exists());
}

#[test]
fn flipped_value_byte_is_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    write_map(&path, &sample());

    let mut data = fs::read(&path).unwrap();
    // last byte of the first entry's key ("\x00\xff"), just past the header
    let idx = HEADER_BYTES as usize + 4 + 4 + 1;
    data[idx] ^= 0x55;
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        DataFileReader::load(&path),
        Err(DataFileError::Corrupt(_))
    ));
}

#[test]
fn bad_footer_magic_is_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    write_map(&path, &sample());

    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        DataFileReader::load(&path),
        Err(DataFileError::Corrupt(_))
    ));
}

#[test]
fn short_file_is_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    fs::write(&path, b"VGD").unwrap();

    assert!(matches!(
        DataFileReader::load(&path),
        Err(DataFileError::Corrupt(_))
    ));
}

#[test]
fn truncated_data_section_is_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    write_map(&path, &sample());

    // Drop three bytes out of the middle but keep the footer intact.
    let data = fs::read(&path).unwrap();
    let footer_start = data.len() - FOOTER_BYTES as usize;
    let mut cut = data[..footer_start - 3].to_vec();
    cut.extend_from_slice(&data[footer_start..]);
    fs::write(&path, &cut).unwrap();

    assert!(matches!(
        DataFileReader::load(&path),
        Err(DataFileError::Corrupt(_))
    ));
}

#[test]
fn large_map_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let m: BTreeMap<Vec<u8>, Vec<u8>> = (0..2000u32)
        .map(|i| (i.to_be_bytes().to_vec(), vec![(i % 251) as u8; (i % 17) as usize]))
        .collect();

    assert_eq!(write_map(&path, &m), 2000);
    assert_eq!(DataFileReader::load(&path).unwrap(), m);
}
