//! Logical clock: the persisted timestamp record.
//!
//! ```text
//! tick^S (4) | gc_cutoff^S (4) | file_id^S (4) | total_size (8, BE)  = 20 bytes
//! ```

use byteorder::{BigEndian, ByteOrder as _};
use codec::{decode_flipped, encode_flipped, CodecError};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

/// Tick of a brand-new cache.
pub const INITIAL_TICK: i32 = i32::MIN + 1;
/// Cutoff of a brand-new cache: nothing is eligible for eviction.
pub const INITIAL_CUTOFF: i32 = i32::MIN;
/// The first allocated file id is `INITIAL_FILE_ID + 1`.
pub const INITIAL_FILE_ID: i32 = i32::MIN;

const ENCODED_LEN: usize = 20;

/// Tick, eviction cutoff, file-id generator and resident size.
///
/// Lock-free: every field is an atomic so foreground threads and both
/// collectors can touch it without a shared lock. Mutations raise the dirty
/// flag, which the next commit consumes.
#[derive(Debug)]
pub struct Clock {
    tick: AtomicI32,
    gc_cutoff: AtomicI32,
    file_id: AtomicI32,
    total_size: AtomicI64,
    dirty: AtomicBool,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_bump(cell: &AtomicI32) -> i32 {
    let prev = cell
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_add(1)))
        .unwrap_or_else(|v| v);
    prev.saturating_add(1)
}

impl Clock {
    pub fn new() -> Self {
        Self {
            tick: AtomicI32::new(INITIAL_TICK),
            gc_cutoff: AtomicI32::new(INITIAL_CUTOFF),
            file_id: AtomicI32::new(INITIAL_FILE_ID),
            total_size: AtomicI64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Advances the tick and returns the new value.
    pub fn new_ts(&self) -> i32 {
        let t = saturating_bump(&self.tick);
        self.dirty.store(true, Ordering::SeqCst);
        t
    }

    /// Current tick, without advancing it.
    pub fn ts(&self) -> i32 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Allocates the next file id.
    pub fn new_file_id(&self) -> i32 {
        let id = saturating_bump(&self.file_id);
        self.dirty.store(true, Ordering::SeqCst);
        id
    }

    /// Entries with a tick strictly below this are eligible for eviction.
    pub fn gc_cutoff(&self) -> i32 {
        self.gc_cutoff.load(Ordering::SeqCst)
    }

    /// Moves the cutoff forward to `cut`, never past the current tick and
    /// never backwards. Returns the resulting cutoff.
    pub fn advance_gc_cutoff(&self, cut: i32) -> i32 {
        let cut = cut.min(self.ts());
        let prev = self.gc_cutoff.fetch_max(cut, Ordering::SeqCst);
        if cut > prev {
            self.dirty.store(true, Ordering::SeqCst);
        }
        prev.max(cut)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::SeqCst).max(0) as u64
    }

    pub fn set_total_size(&self, bytes: u64) {
        self.total_size
            .store(bytes.min(i64::MAX as u64) as i64, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clears the dirty flag, returning its previous value.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&encode_flipped(self.ts()));
        out.extend_from_slice(&encode_flipped(self.gc_cutoff()));
        out.extend_from_slice(&encode_flipped(self.file_id.load(Ordering::SeqCst)));
        out.extend_from_slice(&self.total_size.load(Ordering::SeqCst).to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != ENCODED_LEN {
            return Err(if buf.len() < ENCODED_LEN {
                CodecError::Truncated {
                    expected: ENCODED_LEN,
                    actual: buf.len(),
                }
            } else {
                CodecError::InvalidLength {
                    expected: ENCODED_LEN,
                    actual: buf.len(),
                }
            });
        }
        let tick = decode_flipped(&buf[0..4]);
        let cutoff = decode_flipped(&buf[4..8]);
        Ok(Self {
            tick: AtomicI32::new(tick),
            gc_cutoff: AtomicI32::new(cutoff.min(tick)),
            file_id: AtomicI32::new(decode_flipped(&buf[8..12])),
            total_size: AtomicI64::new(BigEndian::read_i64(&buf[12..20])),
            dirty: AtomicBool::new(false),
        })
    }
}
