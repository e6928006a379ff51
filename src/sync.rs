//! Per-output flip synchronization.
//!
//! One [`FlipSync`] exists per output. It serializes submissions on that
//! output (at most one flip pending at a time), owns the in-flight frame
//! reference across the asynchronous boundary, and is the rendezvous point
//! between submitting threads and the event dispatcher. There is no lock
//! shared across outputs.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::warn;

use crate::frame::FrameSource;

// Timeout for flips, assuming that almost everything can manage 5 fps.
pub(crate) const FLIP_TIMEOUT: Duration = Duration::from_micros(1_000_000 / 5);

/// Outcome of a bounded wait on a pending flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitResult {
    /// The output became idle within the bound.
    Completed,
    /// The bound elapsed with the flip still pending.
    TimedOut,
}

struct FlipInner {
    pending: bool,
    frame: Option<Arc<dyn FrameSource>>,
    buffer_index: usize,
}

/// Monitor guarding the pending flag and the in-flight frame reference of
/// one output.
pub(crate) struct FlipSync {
    inner: Mutex<FlipInner>,
    cond: Condvar,
}

impl FlipSync {
    pub(crate) fn new() -> Self {
        FlipSync {
            inner: Mutex::new(FlipInner {
                pending: false,
                frame: None,
                buffer_index: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn wait_while_pending<'a>(
        &self,
        mut inner: MutexGuard<'a, FlipInner>,
        timeout: Duration,
        what: &str,
    ) -> (MutexGuard<'a, FlipInner>, WaitResult) {
        while inner.pending {
            let (guard, wait) = self.cond.wait_timeout(inner, timeout).unwrap();
            inner = guard;
            if wait.timed_out() && inner.pending {
                warn!("timeout waiting for {} flip to complete", what);
                return (inner, WaitResult::TimedOut);
            }
        }
        (inner, WaitResult::Completed)
    }

    /// Waits (bounded) for the previous submission to clear, then marks a
    /// new one pending, holding a reference on its frame.
    ///
    /// A timed-out wait proceeds anyway rather than blocking the caller on a
    /// stalled output; the stalled submission's reference is dropped here
    /// without a display notification.
    pub(crate) fn begin(
        &self,
        frame: Arc<dyn FrameSource>,
        buffer_index: usize,
        timeout: Duration,
    ) -> WaitResult {
        let inner = self.inner.lock().unwrap();
        let (mut inner, result) = self.wait_while_pending(inner, timeout, "previous");
        inner.frame = Some(frame);
        inner.buffer_index = buffer_index;
        inner.pending = true;
        result
    }

    /// Resolves the pending submission: announces the visible buffer through
    /// the frame's notification hook, releases the reference and wakes all
    /// waiters. A no-op when already idle.
    ///
    /// Only the event dispatcher calls this.
    pub(crate) fn complete(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending {
            if let Some(frame) = inner.frame.take() {
                frame.on_displayed(inner.buffer_index);
            }
        }
        inner.pending = false;
        self.cond.notify_all();
    }

    /// Rolls a submission whose hardware call failed back to idle, dropping
    /// the reference without a display notification.
    pub(crate) fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.frame = None;
        inner.pending = false;
        self.cond.notify_all();
    }

    /// Waits (bounded) until no submission is pending.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> WaitResult {
        let inner = self.inner.lock().unwrap();
        let (_inner, result) = self.wait_while_pending(inner, timeout, "current");
        result
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.inner.lock().unwrap().pending
    }
}

impl fmt::Debug for FlipSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(inner) => f
                .debug_struct("FlipSync")
                .field("pending", &inner.pending)
                .field("buffer_index", &inner.buffer_index)
                .finish_non_exhaustive(),
            Err(_) => f.write_str("FlipSync { <locked> }"),
        }
    }
}
