//! Background garbage collectors.
//!
//! Two daemon threads run per open cache: the Tile GC ([`tile`]) keeps the
//! resident size under budget and moves the eviction cutoff, and the
//! Elevation GC ([`elevation`]) applies that cutoff to elevation samples and
//! reclaims retired surfaces. Both work in short bounded bursts and park on
//! a shared [`StopSignal`] between passes so `close` never waits long.

pub(crate) mod elevation;
pub(crate) mod tile;

use parking_lot::{Condvar, Mutex};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

/// Work time allowed between two pauses.
const PACE_WORK: Duration = Duration::from_millis(30);
/// Length of each pause.
const PACE_REST: Duration = Duration::from_millis(10);

/// Stop flag whose sleeps wake up as soon as it is raised.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps for `duration` or until stopped. Returns `true` if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Keeps a collector from monopolizing a core: after `PACE_WORK` of
/// continuous work it rests for `PACE_REST`.
#[derive(Debug)]
pub(crate) struct Pacer {
    last_rest: Instant,
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            last_rest: Instant::now(),
        }
    }

    /// Yields, resting if due. Returns `true` if stopped meanwhile.
    pub fn pace(&mut self, stop: &StopSignal) -> bool {
        if self.last_rest.elapsed() > PACE_WORK {
            let stopped = stop.sleep(PACE_REST);
            self.last_rest = Instant::now();
            return stopped;
        }
        thread::yield_now();
        stop.is_stopped()
    }
}

/// A running collector thread.
#[derive(Debug)]
pub(crate) struct GcDaemon {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl GcDaemon {
    pub fn spawn<F>(name: &'static str, body: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(body)?;
        Ok(Self {
            name,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Waits for the thread to exit. A daemon never joins itself.
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(daemon = self.name, "collector thread panicked");
        }
    }
}
