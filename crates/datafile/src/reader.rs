use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::format::{read_header, DATAFILE_MAGIC, FOOTER_BYTES, FORMAT_VERSION, HEADER_BYTES};
use crate::DataFileError;

/// Loads a data file written by [`crate::DataFileWriter`].
///
/// Unlike the log, a checkpoint is written atomically, so any damage (short
/// file, CRC mismatch, bad footer) is reported as corruption instead of
/// being silently truncated.
pub struct DataFileReader {}

impl DataFileReader {
    /// Reads every entry into a sorted map.
    ///
    /// A missing file yields an empty map: a brand-new cache has no
    /// checkpoint yet.
    pub fn load(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, DataFileError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let mut map = BTreeMap::new();
        Self::read_all(file, |k, v| {
            map.insert(k, v);
        })?;
        Ok(map)
    }

    /// Streams every entry of `file` into `apply`.
    pub fn read_all<F>(mut file: File, mut apply: F) -> Result<u64, DataFileError>
    where
        F: FnMut(Vec<u8>, Vec<u8>),
    {
        let file_len = file.metadata()?.len();
        if file_len < HEADER_BYTES + FOOTER_BYTES {
            return Err(DataFileError::Corrupt(format!(
                "file too short: {} bytes",
                file_len
            )));
        }

        // Footer first: entry count and trailing magic.
        file.seek(SeekFrom::Start(file_len - FOOTER_BYTES))?;
        let expected = file.read_u64::<LittleEndian>()?;
        let tail_magic = file.read_u32::<LittleEndian>()?;
        if tail_magic != DATAFILE_MAGIC {
            return Err(DataFileError::Corrupt("bad footer magic".into()));
        }

        file.seek(SeekFrom::Start(0))?;
        let data_end = file_len - FOOTER_BYTES;
        let mut rdr = BufReader::new(file).take(data_end);

        let (magic, version) = read_header(&mut rdr)?;
        if magic != DATAFILE_MAGIC {
            return Err(DataFileError::Corrupt("bad header magic".into()));
        }
        if version != FORMAT_VERSION {
            return Err(DataFileError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }

        let mut count: u64 = 0;
        let mut record_buf: Vec<u8> = Vec::with_capacity(64);

        loop {
            let crc = match rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            record_buf.clear();
            let key = read_chunk(&mut rdr, &mut record_buf, data_end)?;
            let value = read_chunk(&mut rdr, &mut record_buf, data_end)?;

            let mut hasher = Crc32::new();
            hasher.update(&record_buf);
            if hasher.finalize() != crc {
                return Err(DataFileError::Corrupt(format!(
                    "crc mismatch at entry {}",
                    count
                )));
            }

            apply(key, value);
            count += 1;
        }

        if count != expected {
            return Err(DataFileError::Corrupt(format!(
                "entry count mismatch: footer says {}, read {}",
                expected, count
            )));
        }
        Ok(count)
    }
}

/// Reads a `[len: u32][bytes]` chunk, mirroring the raw bytes into
/// `crc_buf` so the caller can verify the record checksum.
fn read_chunk<R: Read>(
    rdr: &mut R,
    crc_buf: &mut Vec<u8>,
    limit: u64,
) -> Result<Vec<u8>, DataFileError> {
    let len = rdr
        .read_u32::<LittleEndian>()
        .map_err(|_| DataFileError::Corrupt("truncated entry".into()))?;
    if len as u64 > limit {
        return Err(DataFileError::Corrupt(format!("entry length {} too large", len)));
    }
    let mut chunk = vec![0u8; len as usize];
    rdr.read_exact(&mut chunk)
        .map_err(|_| DataFileError::Corrupt("truncated entry".into()))?;
    crc_buf.extend_from_slice(&len.to_le_bytes());
    crc_buf.extend_from_slice(&chunk);
    Ok(chunk)
}
