use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::format::{write_footer, write_header};
use crate::DataFileError;

/// Writes a complete data file from an iterator of key/value pairs.
pub struct DataFileWriter {}

impl DataFileWriter {
    /// Path of the temporary file used during an atomic write.
    pub fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Writes `iter` to `path` atomically and returns the entry count.
    ///
    /// Entries should arrive in ascending key order; the reader does not
    /// depend on it, but it keeps checkpoints deterministic.
    ///
    /// # Crash Safety
    ///
    /// Writes to `<path>.tmp`, calls `sync_all()`, renames over `path` and
    /// fsyncs the parent directory. A crash mid-write leaves only the temp
    /// file, which the store removes on its next open.
    pub fn write_from_iter<'a, I>(path: &Path, iter: I) -> Result<u64, DataFileError>
    where
        I: Iterator<Item = (&'a [u8], &'a [u8])>,
    {
        let tmp_path = Self::tmp_path(path);
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        write_header(&mut file)?;

        let mut count: u64 = 0;
        let mut record_buf: Vec<u8> = Vec::with_capacity(64);

        for (key, value) in iter {
            record_buf.clear();
            record_buf.write_u32::<LittleEndian>(key.len() as u32)?;
            record_buf.extend_from_slice(key);
            record_buf.write_u32::<LittleEndian>(value.len() as u32)?;
            record_buf.extend_from_slice(value);

            let mut hasher = Crc32::new();
            hasher.update(&record_buf);

            file.write_u32::<LittleEndian>(hasher.finalize())?;
            file.write_all(&record_buf)?;
            count += 1;
        }

        write_footer(&mut file, count)?;

        file.flush()?;
        file.into_inner()
            .map_err(|e| DataFileError::Io(e.into_error()))?
            .sync_all()?;

        rename(&tmp_path, path)?;

        // Make the rename itself durable on ext4/XFS.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(count)
    }
}
