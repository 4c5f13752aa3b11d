//! Pyramid and surface registries.
//!
//! Both are small, rarely mutated maps persisted as a single record each.
//! Callers keep them behind one coarse mutex apiece; each surface entry has
//! its own mutex and condition variable on top of that so operations on
//! different surfaces never contend.
//!
//! Lock order: registry → surface entry → index → store.

use byteorder::{BigEndian, ReadBytesExt};
use codec::CodecError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use store::RecId;

use crate::error::{CacheError, Result};
use crate::model::ModelParams;

pub(crate) const PYRAMID_RECORD_DESCRIPTOR: &str = "pyramid-record|id,name";
pub(crate) const SURFACE_RECORD_DESCRIPTOR: &str =
    "surface-record|a,f,h_scale,version,model_type,recid,tick";

// --------------------- decoding helpers ---------------------

fn truncated(buf: &[u8], want: usize) -> CodecError {
    CodecError::Truncated {
        expected: want,
        actual: buf.len(),
    }
}

fn read_u32(buf: &mut &[u8]) -> std::result::Result<u32, CodecError> {
    let snapshot = *buf;
    buf.read_u32::<BigEndian>()
        .map_err(|_| truncated(snapshot, 4))
}

fn read_string(buf: &mut &[u8]) -> std::result::Result<String, CodecError> {
    let len = read_u32(buf)? as usize;
    if buf.len() < len {
        return Err(truncated(buf, len));
    }
    let (s, rest) = buf.split_at(len);
    *buf = rest;
    String::from_utf8(s.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

// --------------------- pyramids ---------------------

/// Bidirectional map between tile pyramid names and their integer ids.
#[derive(Debug, Default)]
pub struct PyramidRegistry {
    by_name: HashMap<String, i32>,
    by_id: HashMap<i32, String>,
}

impl PyramidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Initial probe position for `name`.
    pub fn hash_id(name: &str) -> i32 {
        crc32fast::hash(name.as_bytes()) as i32
    }

    /// Returns the id of `name`, assigning one if needed. The flag is `true`
    /// when a new id was assigned.
    ///
    /// New ids start at the name's hash and probe linearly (wrapping) past
    /// ids already taken.
    pub fn resolve(&mut self, name: &str) -> Result<(i32, bool)> {
        if let Some(id) = self.id(name) {
            return Ok((id, false));
        }
        let start = Self::hash_id(name);
        let mut id = start;
        while self.by_id.contains_key(&id) {
            id = id.wrapping_add(1);
            if id == start {
                return Err(CacheError::IdSpaceExhausted);
            }
        }
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        Ok((id, true))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut entries: Vec<(&i32, &String)> = self.by_id.iter().collect();
        entries.sort();
        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for (id, name) in entries {
            out.extend_from_slice(&id.to_be_bytes());
            write_string(&mut out, name);
        }
        out
    }

    pub fn decode(mut buf: &[u8]) -> std::result::Result<Self, CodecError> {
        let count = read_u32(&mut buf)?;
        let mut reg = Self::new();
        for _ in 0..count {
            let id = read_u32(&mut buf)? as i32;
            let name = read_string(&mut buf)?;
            reg.by_name.insert(name.clone(), id);
            reg.by_id.insert(id, name);
        }
        Ok(reg)
    }
}

// --------------------- surfaces ---------------------

/// Persisted and transient state of one elevation surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub params: ModelParams,
    /// Recid of the surface's private elevation index.
    pub recid: RecId,
    pub last_access_tick: i32,
    /// A bulk writer holds the surface; the Elevation GC must wait.
    pub busy: bool,
    /// The surface left the registry; handles bound to it must re-bind.
    pub retired: bool,
}

impl SurfaceRecord {
    pub fn new(params: ModelParams, recid: RecId) -> Self {
        Self {
            params,
            recid,
            last_access_tick: i32::MAX,
            busy: false,
            retired: false,
        }
    }
}

/// A registered surface: its record behind a mutex plus the condition
/// variable used for the busy flag.
#[derive(Debug)]
pub struct SurfaceEntry {
    record: Mutex<SurfaceRecord>,
    cond: Condvar,
}

impl SurfaceEntry {
    pub fn new(record: SurfaceRecord) -> Self {
        Self {
            record: Mutex::new(record),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SurfaceRecord> {
        self.record.lock()
    }

    /// Blocks while the surface is busy. Gives up (returning `false`) once
    /// `keep_waiting` turns false.
    pub fn wait_while_busy(
        &self,
        guard: &mut MutexGuard<'_, SurfaceRecord>,
        keep_waiting: impl Fn() -> bool,
    ) -> bool {
        while guard.busy {
            if !keep_waiting() {
                return false;
            }
            self.cond.wait_for(guard, Duration::from_millis(50));
        }
        true
    }

    /// Wakes every thread waiting on the busy flag.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

/// Live surfaces by name plus the queue of retired index recids awaiting
/// incremental reclamation.
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    surfaces: HashMap<String, Arc<SurfaceEntry>>,
    deleted_recids: Vec<RecId>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Live (not retired) entry for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<SurfaceEntry>> {
        self.surfaces
            .get(name)
            .filter(|e| !e.lock().retired)
            .cloned()
    }

    /// Registers `record` under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: &str, record: SurfaceRecord) -> Arc<SurfaceEntry> {
        let entry = Arc::new(SurfaceEntry::new(record));
        self.surfaces.insert(name.to_string(), entry.clone());
        entry
    }

    /// Removes `name` and queues its index for deferred deletion. Returns
    /// the queued recid.
    pub fn retire(&mut self, name: &str) -> Option<RecId> {
        let entry = self.surfaces.remove(name)?;
        let recid = {
            let mut rec = entry.lock();
            rec.retired = true;
            rec.recid
        };
        entry.notify_all();
        if !self.deleted_recids.contains(&recid) {
            self.deleted_recids.push(recid);
        }
        Some(recid)
    }

    /// Removes `name` only if it still maps to `entry`. Used when the caller
    /// deletes the surface's storage itself.
    pub fn remove_if_same(&mut self, name: &str, entry: &Arc<SurfaceEntry>) -> bool {
        match self.surfaces.get(name) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                self.surfaces.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of live entries.
    pub fn entries(&self) -> Vec<(String, Arc<SurfaceEntry>)> {
        self.surfaces
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn pending_deletions(&self) -> Vec<RecId> {
        self.deleted_recids.clone()
    }

    pub fn finish_deletion(&mut self, recid: RecId) {
        self.deleted_recids.retain(|r| *r != recid);
    }

    /// Wakes busy-flag waiters on every surface (used at shutdown).
    pub fn notify_all(&self) {
        for entry in self.surfaces.values() {
            entry.notify_all();
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut names: Vec<&String> = self.surfaces.keys().collect();
        names.sort();

        let mut out = Vec::new();
        out.extend_from_slice(&(names.len() as u32).to_be_bytes());
        for name in names {
            let rec = self.surfaces[name].lock().clone();
            write_string(&mut out, name);
            out.extend_from_slice(&rec.params.ellipsoid_a.to_be_bytes());
            out.extend_from_slice(&rec.params.ellipsoid_f.to_be_bytes());
            out.extend_from_slice(&rec.params.height_scale.to_be_bytes());
            out.extend_from_slice(&rec.params.version.to_be_bytes());
            out.extend_from_slice(&rec.params.model_type.to_be_bytes());
            out.extend_from_slice(&rec.recid.to_be_bytes());
            out.extend_from_slice(&rec.last_access_tick.to_be_bytes());
        }
        out.extend_from_slice(&(self.deleted_recids.len() as u32).to_be_bytes());
        for recid in &self.deleted_recids {
            out.extend_from_slice(&recid.to_be_bytes());
        }
        out
    }

    pub fn decode(mut buf: &[u8]) -> std::result::Result<Self, CodecError> {
        let mut reg = Self::new();
        let count = read_u32(&mut buf)?;
        for _ in 0..count {
            let name = read_string(&mut buf)?;
            let snapshot = buf;
            let rec = (|| -> std::io::Result<SurfaceRecord> {
                let params = ModelParams {
                    ellipsoid_a: buf.read_f64::<BigEndian>()?,
                    ellipsoid_f: buf.read_f64::<BigEndian>()?,
                    height_scale: buf.read_f32::<BigEndian>()?,
                    version: buf.read_i32::<BigEndian>()?,
                    model_type: buf.read_i32::<BigEndian>()?,
                };
                let recid = buf.read_u64::<BigEndian>()?;
                let mut rec = SurfaceRecord::new(params, recid);
                rec.last_access_tick = buf.read_i32::<BigEndian>()?;
                Ok(rec)
            })()
            .map_err(|_| truncated(snapshot, 40))?;
            reg.surfaces.insert(name, Arc::new(SurfaceEntry::new(rec)));
        }
        let deleted = read_u32(&mut buf)?;
        for _ in 0..deleted {
            let snapshot = buf;
            let recid = buf
                .read_u64::<BigEndian>()
                .map_err(|_| truncated(snapshot, 8))?;
            reg.deleted_recids.push(recid);
        }
        Ok(reg)
    }
}
