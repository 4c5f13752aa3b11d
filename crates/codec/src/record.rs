use crate::{check_len, decode_flipped, encode_flipped, CodecError, ValueCodec};
use byteorder::{BigEndian, ByteOrder as _};

/// One cached elevation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevationRecord {
    pub height: i32,
    pub delta_height: i32,
    /// Logical clock value of the last access.
    pub tick: i32,
}

impl ElevationRecord {
    /// Size of the encoded record.
    pub const ENCODED_LEN: usize = 12;

    pub fn new(height: i32, delta_height: i32, tick: i32) -> Self {
        Self {
            height,
            delta_height,
            tick,
        }
    }

    /// Encodes into the fixed 12-byte layout.
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&encode_flipped(self.height));
        out[4..8].copy_from_slice(&encode_flipped(self.delta_height));
        out[8..12].copy_from_slice(&encode_flipped(self.tick));
        out
    }

    /// Decodes a 12-byte record.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        check_len(buf, Self::ENCODED_LEN)?;
        Ok(Self {
            height: decode_flipped(&buf[0..4]),
            delta_height: decode_flipped(&buf[4..8]),
            tick: decode_flipped(&buf[8..12]),
        })
    }
}

impl ValueCodec for ElevationRecord {
    const NAME: &'static str = "elevation-record";

    fn encode(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        Self::from_bytes(buf)
    }
}

/// File index value: where a URL's bytes live and when they were last used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: i32,
    pub tick: i32,
}

impl FileRecord {
    pub const ENCODED_LEN: usize = 8;

    pub fn new(file_id: i32, tick: i32) -> Self {
        Self { file_id, tick }
    }
}

impl ValueCodec for FileRecord {
    const NAME: &'static str = "file-record";

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&encode_flipped(self.file_id));
        out.extend_from_slice(&encode_flipped(self.tick));
        out
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        check_len(buf, Self::ENCODED_LEN)?;
        Ok(Self {
            file_id: decode_flipped(&buf[0..4]),
            tick: decode_flipped(&buf[4..8]),
        })
    }
}

/// Composite tile key: pyramid id followed by the tile's position code.
///
/// The pyramid id is written big-endian without the sign flip, so all tiles
/// of one pyramid form a contiguous range under unsigned byte order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub pyramid_id: i32,
    pub position_code: String,
}

impl TileKey {
    pub fn new(pyramid_id: i32, position_code: impl Into<String>) -> Self {
        Self {
            pyramid_id,
            position_code: position_code.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let code = self.position_code.as_bytes();
        let mut out = vec![0u8; 4 + code.len()];
        BigEndian::write_i32(&mut out[0..4], self.pyramid_id);
        out[4..].copy_from_slice(code);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < 4 {
            return Err(CodecError::Truncated {
                expected: 4,
                actual: buf.len(),
            });
        }
        let pyramid_id = BigEndian::read_i32(&buf[0..4]);
        let position_code = std::str::from_utf8(&buf[4..])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();
        Ok(Self {
            pyramid_id,
            position_code,
        })
    }
}
