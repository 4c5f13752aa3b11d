//! Data file constants and header/footer helpers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Write};

/// Magic number identifying cache data files (ASCII "VGD1").
pub const DATAFILE_MAGIC: u32 = 0x5647_4431;

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Header size: 4 (`magic`) + 2 (`format_version`).
pub const HEADER_BYTES: u64 = 4 + 2;

/// Footer size: 8 (`entry_count`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 4;

pub(crate) fn write_header<W: Write>(w: &mut W) -> IoResult<()> {
    w.write_u32::<LittleEndian>(DATAFILE_MAGIC)?;
    w.write_u16::<LittleEndian>(FORMAT_VERSION)?;
    Ok(())
}

/// Reads the header, returning `(magic, version)`.
pub(crate) fn read_header<R: Read>(r: &mut R) -> IoResult<(u32, u16)> {
    let magic = r.read_u32::<LittleEndian>()?;
    let version = r.read_u16::<LittleEndian>()?;
    Ok((magic, version))
}

pub(crate) fn write_footer<W: Write>(w: &mut W, entry_count: u64) -> IoResult<()> {
    w.write_u64::<LittleEndian>(entry_count)?;
    w.write_u32::<LittleEndian>(DATAFILE_MAGIC)?;
    Ok(())
}
