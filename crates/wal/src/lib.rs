//! # WAL - Record Store Mutation Log
//!
//! Append-only log backing `cache.lg`. Every mutation of the record store
//! (`PUT` or `DELETE` of a byte key) is framed, CRC-checksummed and appended
//! here; on open the log is replayed on top of the last checkpoint
//! (`cache.db`) to rebuild the in-memory table.
//!
//! The cache runs with transactions disabled: appends are buffered and only
//! pushed to the OS on [`WalWriter::flush`]. A crash can therefore leave a
//! torn last frame. Replay stops cleanly in front of it and reports how many
//! bytes were intact ([`Replay::valid_len`]) so the owner can cut the tail
//! off before appending again.
//!
//! ## Frame
//!
//! ```text
//! [frame_len: u32 LE][crc32(body): u32 LE][body ...]
//! ```
//!
//! `frame_len` counts the CRC and the body, not itself.
//!
//! ```text
//! PUT  [0u8][key_len: u32 LE][key][val_len: u32 LE][value]
//! DEL  [1u8][key_len: u32 LE][key]
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalReader, WalRecord, WalWriter};
//!
//! let mut w = WalWriter::create("cache.lg").unwrap();
//! w.append(&WalRecord::Put { key: b"k".to_vec(), value: b"v".to_vec() }).unwrap();
//! w.flush().unwrap();
//!
//! let stats = WalReader::open("cache.lg").unwrap().replay(|rec| println!("{rec:?}")).unwrap();
//! assert!(!stats.torn_tail);
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Bytes in front of every body: length + CRC.
pub const FRAME_HEADER_LEN: u64 = 8;

/// Upper bound on `frame_len`; anything larger is treated as corruption.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_DEL: u8 = 1;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Insert or overwrite `key`.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove `key`.
    Del { key: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame at `offset` failed its CRC or does not decode.
    #[error("corrupt log frame at byte {offset}")]
    Corrupt { offset: u64 },
}

fn put_chunk(out: &mut Vec<u8>, bytes: &[u8]) {
    // Vec<u8> writes are infallible.
    let _ = out.write_u32::<LittleEndian>(bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn take_chunk(body: &mut &[u8]) -> Option<Vec<u8>> {
    let len = body.read_u32::<LittleEndian>().ok()? as usize;
    if len > body.len() {
        return None;
    }
    let (chunk, rest) = body.split_at(len);
    *body = rest;
    Some(chunk.to_vec())
}

impl WalRecord {
    /// Appends the frame body (no header) to `out`.
    fn encode_body(&self, out: &mut Vec<u8>) {
        match self {
            WalRecord::Put { key, value } => {
                out.push(OP_PUT);
                put_chunk(out, key);
                put_chunk(out, value);
            }
            WalRecord::Del { key } => {
                out.push(OP_DEL);
                put_chunk(out, key);
            }
        }
    }

    /// Parses a CRC-verified body. Trailing bytes are rejected.
    fn decode_body(mut body: &[u8]) -> Option<Self> {
        let op = body.read_u8().ok()?;
        let key = take_chunk(&mut body)?;
        let record = match op {
            OP_PUT => WalRecord::Put {
                key,
                value: take_chunk(&mut body)?,
            },
            OP_DEL => WalRecord::Del { key },
            _ => return None,
        };
        body.is_empty().then_some(record)
    }
}

/// Buffered append-only log writer.
pub struct WalWriter {
    file: BufWriter<File>,
    /// Bytes in the log, including buffered but unflushed frames.
    len: u64,
    /// Scratch space reused by every append.
    frame: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a log file and positions at its end.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: BufWriter::new(file),
            len,
            frame: Vec::with_capacity(256),
        })
    }

    /// Frames `record` into the write buffer. Nothing reaches the file
    /// until [`WalWriter::flush`] (or the buffer fills up).
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        self.frame.clear();
        self.frame.resize(FRAME_HEADER_LEN as usize, 0);
        record.encode_body(&mut self.frame);

        let body = &self.frame[FRAME_HEADER_LEN as usize..];
        let frame_len = body.len() as u64 + 4;
        if frame_len > MAX_FRAME_LEN as u64 {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log frame of {frame_len} bytes exceeds the limit"),
            )));
        }
        let crc = crc32fast::hash(body);
        self.frame[0..4].copy_from_slice(&(frame_len as u32).to_le_bytes());
        self.frame[4..8].copy_from_slice(&crc.to_le_bytes());

        self.file.write_all(&self.frame)?;
        self.len += self.frame.len() as u64;
        Ok(())
    }

    /// Pushes buffered frames to the OS without forcing them to disk.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs the log.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Log length in bytes, flushed or not.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Summary of one [`WalReader::replay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Replay {
    /// Records handed to the callback.
    pub records: u64,
    /// Bytes covered by complete, valid frames.
    pub valid_len: u64,
    /// The log ended inside a frame.
    pub torn_tail: bool,
}

/// Outcome of reading `buf.len()` bytes at the current position.
enum Fill {
    Full,
    /// Hit end of input; `true` if some bytes were read first.
    End(bool),
}

fn fill<R: Read>(rdr: &mut R, buf: &mut [u8]) -> io::Result<Fill> {
    let mut read = 0;
    while read < buf.len() {
        match rdr.read(&mut buf[read..]) {
            Ok(0) => return Ok(Fill::End(read > 0)),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Fill::Full)
}

/// Sequential log reader.
///
/// Generic over any `Read` implementor so tests can replay in-memory buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
    /// Offset of the next frame.
    offset: u64,
    body: Vec<u8>,
}

impl WalReader<File> {
    /// Opens an existing log file for replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        Ok(Self::from_reader(File::open(path)?))
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            rdr: BufReader::new(reader),
            offset: 0,
            body: Vec::with_capacity(256),
        }
    }

    /// Reads the next frame. `Ok(None)` at the end of the log, whether it
    /// ends cleanly or inside a torn frame; `torn` tells which.
    fn next_record(&mut self, torn: &mut bool) -> Result<Option<WalRecord>, WalError> {
        let corrupt = WalError::Corrupt {
            offset: self.offset,
        };

        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        match fill(&mut self.rdr, &mut header)? {
            Fill::Full => {}
            Fill::End(partial) => {
                *torn = partial;
                return Ok(None);
            }
        }
        let frame_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if frame_len <= 4 || frame_len > MAX_FRAME_LEN {
            return Err(corrupt);
        }

        self.body.clear();
        self.body.resize((frame_len - 4) as usize, 0);
        if let Fill::End(_) = fill(&mut self.rdr, &mut self.body)? {
            *torn = true;
            return Ok(None);
        }
        if crc32fast::hash(&self.body) != crc {
            return Err(corrupt);
        }
        let record = WalRecord::decode_body(&self.body).ok_or(corrupt)?;
        self.offset += FRAME_HEADER_LEN + self.body.len() as u64;
        Ok(Some(record))
    }

    /// Feeds every intact record to `apply`, in log order.
    ///
    /// A torn final frame ends the replay successfully with
    /// [`Replay::torn_tail`] set. A CRC mismatch, an impossible frame
    /// length or an undecodable body anywhere is [`WalError::Corrupt`].
    pub fn replay<F>(&mut self, mut apply: F) -> Result<Replay, WalError>
    where
        F: FnMut(WalRecord),
    {
        let mut stats = Replay::default();
        while let Some(record) = self.next_record(&mut stats.torn_tail)? {
            apply(record);
            stats.records += 1;
        }
        stats.valid_len = self.offset;
        Ok(stats)
    }
}
