use super::*;
use std::cmp::Ordering;

// -------------------- Sign-flip integers --------------------

#[test]
fn flipped_roundtrip_at_boundaries() {
    for v in [i32::MIN, i32::MIN + 1, -1, 0, 1, 12345, i32::MAX - 1, i32::MAX] {
        assert_eq!(decode_flipped(&encode_flipped(v)), v, "value {}", v);
    }
}

#[test]
fn flipped_encoding_sorts_numerically() {
    let values = [i32::MIN, -70_000, -1, 0, 1, 70_000, i32::MAX];
    for pair in values.windows(2) {
        assert!(encode_flipped(pair[0]) < encode_flipped(pair[1]));
    }
    assert_eq!(encode_flipped(i32::MIN), [0, 0, 0, 0]);
    assert_eq!(encode_flipped(i32::MAX), [0xFF, 0xFF, 0xFF, 0xFF]);
}

// -------------------- Elevation records --------------------

#[test]
fn elevation_record_preserves_negative_fields() {
    let rec = ElevationRecord::new(-432, i32::MIN, i32::MAX);
    let bytes = rec.to_bytes();
    assert_eq!(bytes.len(), ElevationRecord::ENCODED_LEN);
    assert_eq!(ElevationRecord::from_bytes(&bytes).unwrap(), rec);
}

#[test]
fn elevation_record_layout_is_flipped_big_endian() {
    let rec = ElevationRecord::new(0, -1, 1);
    assert_eq!(
        rec.to_bytes(),
        [0x80, 0, 0, 0, 0x7F, 0xFF, 0xFF, 0xFF, 0x80, 0, 0, 1]
    );
}

#[test]
fn elevation_record_rejects_wrong_length() {
    assert_eq!(
        ElevationRecord::from_bytes(&[0u8; 11]),
        Err(CodecError::Truncated {
            expected: 12,
            actual: 11
        })
    );
    assert_eq!(
        ElevationRecord::from_bytes(&[0u8; 13]),
        Err(CodecError::InvalidLength {
            expected: 12,
            actual: 13
        })
    );
}

// -------------------- File records & ticks --------------------

#[test]
fn file_record_roundtrip() {
    let rec = FileRecord::new(i32::MIN + 1, -5);
    let bytes = rec.encode();
    assert_eq!(bytes.len(), 8);
    assert_eq!(FileRecord::decode(&bytes).unwrap(), rec);
}

#[test]
fn tick_value_codec() {
    let bytes = ValueCodec::encode(&-17i32);
    assert_eq!(<i32 as ValueCodec>::decode(&bytes).unwrap(), -17);
    assert!(<i32 as ValueCodec>::decode(&bytes[..3]).is_err());
}

// -------------------- Tile keys --------------------

#[test]
fn tile_key_prefix_is_unflipped_pyramid_id() {
    let key = TileKey::new(-2, "0312");
    let bytes = key.encode();
    assert_eq!(&bytes[0..4], &[0xFF, 0xFF, 0xFF, 0xFE]);
    assert_eq!(&bytes[4..], b"0312");
    assert_eq!(TileKey::decode(&bytes).unwrap(), key);
}

#[test]
fn tile_key_with_empty_position_code() {
    let key = TileKey::new(7, "");
    assert_eq!(key.encode().len(), 4);
    assert_eq!(TileKey::decode(&key.encode()).unwrap(), key);
}

#[test]
fn tile_key_rejects_short_or_non_utf8() {
    assert!(matches!(
        TileKey::decode(&[1, 2]),
        Err(CodecError::Truncated { .. })
    ));
    assert_eq!(
        TileKey::decode(&[0, 0, 0, 1, 0xFF, 0xFE]),
        Err(CodecError::InvalidUtf8)
    );
}

// -------------------- Comparators --------------------

#[test]
fn byte_order_is_unsigned_lexicographic() {
    assert_eq!(ByteOrder::compare(b"a", b"b"), Ordering::Less);
    assert_eq!(ByteOrder::compare(&[0x80], &[0x7F]), Ordering::Greater);
    assert_eq!(ByteOrder::compare(b"ab", b"a"), Ordering::Greater);
}

#[test]
fn size_first_orders_shorter_keys_first() {
    assert_eq!(SizeFirst::compare(&[0xFF], &[0x00, 0x00]), Ordering::Less);
    assert_eq!(SizeFirst::compare(&[1, 2], &[1, 3]), Ordering::Less);
    assert_eq!(SizeFirst::compare(&[1, 2], &[1, 2]), Ordering::Equal);
}

#[test]
fn size_first_reads_length_prefixed_keys() {
    // 9-byte key whose significant length is 2: compares equal to the bare form.
    let prefixed = [2u8, 7, 9, 0, 0, 0, 0, 0, 0];
    assert_eq!(SizeFirst::compare(&prefixed, &[7, 9]), Ordering::Equal);
    assert_eq!(SizeFirst::compare(&prefixed, &[7, 9, 1]), Ordering::Less);
}
