use std::cmp::Ordering;

/// Total order over raw index keys.
///
/// Comparators are zero-sized marker types so an index can be generic over
/// its ordering without storing a function pointer per entry.
pub trait KeyComparator: Send + Sync + 'static {
    /// Stable type descriptor recorded in index descriptors.
    const NAME: &'static str;

    fn compare(a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain unsigned lexicographic order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteOrder;

impl KeyComparator for ByteOrder {
    const NAME: &'static str = "byte-order";

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Size-first order used for spatial elevation keys.
///
/// Shorter keys sort before longer ones (coarser quadtree levels first);
/// keys of equal significant length compare as unsigned bytes. A 9-byte key
/// is length-prefixed: byte 0 holds the significant length and the payload
/// starts at byte 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeFirst;

impl SizeFirst {
    /// Length-prefixed encoded size.
    pub const PREFIXED_LEN: usize = 9;

    fn significant(key: &[u8]) -> &[u8] {
        if key.len() == Self::PREFIXED_LEN {
            let len = (key[0] as usize).min(Self::PREFIXED_LEN - 1);
            &key[1..1 + len]
        } else {
            key
        }
    }
}

impl KeyComparator for SizeFirst {
    const NAME: &'static str = "size-first";

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        let a = Self::significant(a);
        let b = Self::significant(b);
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}
