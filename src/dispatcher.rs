//! The completion event dispatcher.
//!
//! Exactly one [`EventDispatcher`] runs per display connection. Its thread
//! blocks on the device's event source and, for every delivered completion,
//! resolves the event's token back to the originating output's flip state
//! and clears it. Nothing else happens on that path; the distance from
//! event arrival to waiter wake-up stays short.
//!
//! Hardware delivers each output's events in submission order, and the flip
//! state assumes exactly one completer, so this worker must never be
//! duplicated.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace, warn};

use crate::device::{EventToken, ScanoutDevice};
use crate::sync::FlipSync;

/// Table correlating event tokens with the flip state of the output that
/// issued the submission.
///
/// Tokens are slot indices; resolution is bounds-checked, and a slot freed
/// by a torn-down output resolves to nothing, so a completion event that is
/// still in flight during teardown is discarded instead of reaching freed
/// state.
#[derive(Debug, Default)]
pub struct FlipRegistry {
    slots: Mutex<Vec<Option<Arc<FlipSync>>>>,
}

impl FlipRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Default::default())
    }

    pub(crate) fn register(&self, sync: Arc<FlipSync>) -> EventToken {
        let mut slots = self.slots.lock().unwrap();
        match slots.iter().position(Option::is_none) {
            Some(slot) => {
                slots[slot] = Some(sync);
                EventToken::new(slot)
            }
            None => {
                slots.push(Some(sync));
                EventToken::new(slots.len() - 1)
            }
        }
    }

    pub(crate) fn unregister(&self, token: EventToken) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(token.slot()) {
            *slot = None;
        }
    }

    fn resolve(&self, token: EventToken) -> Option<Arc<FlipSync>> {
        self.slots.lock().unwrap().get(token.slot()).cloned().flatten()
    }
}

/// The background worker draining completion events for one display
/// connection.
///
/// Spawn it once, before the first submission. On teardown,
/// [`shutdown`](EventDispatcher::shutdown) (or dropping the dispatcher)
/// stops the loop, wakes the event source and joins the thread.
pub struct EventDispatcher {
    device: Arc<dyn ScanoutDevice>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Spawns the dispatch thread.
    pub fn spawn(device: Arc<dyn ScanoutDevice>, registry: Arc<FlipRegistry>) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread = thread::Builder::new().name("scanout-events".into()).spawn({
            let device = device.clone();
            let running = running.clone();
            move || dispatch_loop(&*device, &registry, &running)
        })?;
        Ok(EventDispatcher {
            device,
            running,
            thread: Some(thread),
        })
    }

    /// Stops the dispatch loop and joins the thread.
    pub fn shutdown(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        if let Err(err) = self.device.wake() {
            warn!("failed to wake the event source for shutdown: {}", err);
        }
        if thread.join().is_err() {
            error!("event dispatcher thread panicked");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn dispatch_loop(device: &dyn ScanoutDevice, registry: &FlipRegistry, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        let events = match device.receive_events() {
            Ok(events) => events,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!("error reading the scan-out event source: {}", err);
                break;
            }
        };
        for event in events {
            trace!(
                token = event.token.raw(),
                sequence = event.sequence,
                "completion event"
            );
            match registry.resolve(event.token) {
                Some(sync) => sync.complete(),
                None => debug!(
                    token = event.token.raw(),
                    "completion event for a torn-down output"
                ),
            }
        }
    }
}
