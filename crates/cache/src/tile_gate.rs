//! Mutual-exclusion gate around the shared tile index.
//!
//! Exactly one of a foreground tile request or one Tile GC slice holds the
//! gate at a time. Waiters re-check the manager's `enabled` flag every time
//! they wake, so shutdown never strands a caller here.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const RECHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct TileGate {
    locked: Mutex<bool>,
    cond: Condvar,
}

/// Releases the gate when dropped.
#[derive(Debug)]
pub struct TileGateGuard<'a> {
    gate: &'a TileGate,
}

impl TileGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the gate. Returns `None` once `enabled` turns false.
    pub fn acquire(&self, enabled: &AtomicBool) -> Option<TileGateGuard<'_>> {
        let mut locked = self.locked.lock();
        loop {
            if !enabled.load(Ordering::SeqCst) {
                return None;
            }
            if !*locked {
                *locked = true;
                return Some(TileGateGuard { gate: self });
            }
            self.cond.wait_for(&mut locked, RECHECK_INTERVAL);
        }
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }

    /// Wakes every waiter so it can observe a shutdown.
    pub fn wake_all(&self) {
        self.cond.notify_all();
    }
}

impl Drop for TileGateGuard<'_> {
    fn drop(&mut self) {
        *self.gate.locked.lock() = false;
        self.gate.cond.notify_all();
    }
}
