//! # Codec - Fixed-Width Cache Records
//!
//! Binary encoders and decoders for every value the cache persists in its
//! indexes, plus the key comparators those indexes are parameterized over.
//!
//! ## Integer encoding
//!
//! Signed integers stored as index values are written **big-endian with the
//! sign bit flipped** (`v ^ 0x8000_0000`). This makes the byte-wise unsigned
//! order of the encoding agree with the numeric order of the value, so
//! `i32::MIN` encodes as `00 00 00 00` and `i32::MAX` as `FF FF FF FF`.
//!
//! ## Record layouts
//!
//! ```text
//! ElevationRecord  height^S (4) | delta_height^S (4) | tick^S (4)   = 12 bytes
//! FileRecord       file_id^S (4) | tick^S (4)                        =  8 bytes
//! TileKey          pyramid_id (4, big-endian, NOT flipped) | position code (UTF-8)
//! tick (i32)       tick^S (4)
//! ```
//!
//! `S` is [`SIGN_FLIP`].

mod order;
mod record;

pub use order::{ByteOrder, KeyComparator, SizeFirst};
pub use record::{ElevationRecord, FileRecord, TileKey};

use byteorder::{BigEndian, ByteOrder as _};
use thiserror::Error;

/// Mask applied to signed values so their encoding sorts numerically.
pub const SIGN_FLIP: u32 = 0x8000_0000;

/// Errors raised while decoding a persisted record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than the fixed layout requires.
    #[error("truncated record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A fixed-width record carried trailing bytes.
    #[error("invalid record length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A string component was not valid UTF-8.
    #[error("invalid utf-8 in record")]
    InvalidUtf8,
}

/// Encodes `v` big-endian with the sign bit flipped.
#[inline]
pub fn encode_flipped(v: i32) -> [u8; 4] {
    ((v as u32) ^ SIGN_FLIP).to_be_bytes()
}

/// Inverse of [`encode_flipped`]. `buf` must hold at least 4 bytes.
#[inline]
pub fn decode_flipped(buf: &[u8]) -> i32 {
    (BigEndian::read_u32(buf) ^ SIGN_FLIP) as i32
}

/// Checks that `buf` is exactly `expected` bytes long.
pub(crate) fn check_len(buf: &[u8], expected: usize) -> Result<(), CodecError> {
    if buf.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    if buf.len() > expected {
        return Err(CodecError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// A value type an index can persist.
///
/// `NAME` is written into the index descriptor so an index reopened with a
/// different value type is detected instead of silently misdecoded.
pub trait ValueCodec: Sized + Clone + Send + Sync + 'static {
    /// Stable type descriptor recorded in the database header.
    const NAME: &'static str;

    /// Serializes the value.
    fn encode(&self) -> Vec<u8>;

    /// Deserializes a value produced by [`ValueCodec::encode`].
    fn decode(buf: &[u8]) -> Result<Self, CodecError>;
}

/// Access ticks are stored as sign-flipped 4-byte integers.
impl ValueCodec for i32 {
    const NAME: &'static str = "int4";

    fn encode(&self) -> Vec<u8> {
        encode_flipped(*self).to_vec()
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        check_len(buf, 4)?;
        Ok(decode_flipped(buf))
    }
}

#[cfg(test)]
mod tests;
