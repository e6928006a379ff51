//! Test doubles for the hardware and resource seams.

use std::collections::HashSet;
use std::io;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use drm::control::{connector, crtc, framebuffer, plane, property};

use crate::device::{CompletionEvent, EventToken, PageFlipFlags, ScanoutDevice};
use crate::frame::FrameSource;
use crate::output::{CrtcBinding, OutputMode, Rect};

pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn crtc(n: u32) -> crtc::Handle {
    crtc::Handle::from(NonZeroU32::new(n).unwrap())
}

pub(crate) fn connector(n: u32) -> connector::Handle {
    connector::Handle::from(NonZeroU32::new(n).unwrap())
}

pub(crate) fn plane(n: u32) -> plane::Handle {
    plane::Handle::from(NonZeroU32::new(n).unwrap())
}

pub(crate) fn framebuffer(n: u32) -> framebuffer::Handle {
    framebuffer::Handle::from(NonZeroU32::new(n).unwrap())
}

pub(crate) fn prop(n: u32) -> property::Handle {
    property::Handle::from(NonZeroU32::new(n).unwrap())
}

pub(crate) fn mode() -> OutputMode {
    OutputMode {
        width: 1920,
        height: 1080,
        refresh: 60,
    }
}

/// A crtc/connector pair sharing the ordinal `n`.
pub(crate) fn binding(n: u32) -> CrtcBinding {
    CrtcBinding {
        crtc: crtc(n),
        connector: connector(n),
    }
}

/// One hardware call recorded by [`MockDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeviceCall {
    SetCrtc {
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        connector: connector::Handle,
    },
    PageFlip {
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        flags: PageFlipFlags,
        token: Option<EventToken>,
    },
    SetPlane {
        plane: plane::Handle,
        crtc: crtc::Handle,
        fb: Option<framebuffer::Handle>,
        dst: Rect,
        src: Rect,
    },
    SetPlaneProperty {
        plane: plane::Handle,
        prop: property::Handle,
        value: u64,
    },
    RequestVblank {
        crtc: crtc::Handle,
        token: EventToken,
    },
}

enum MockEvent {
    Completion(CompletionEvent),
    Wake,
}

/// A scripted [`ScanoutDevice`]: records every call, fails on demand and
/// feeds completion events through a channel.
pub(crate) struct MockDevice {
    calls: Mutex<Vec<DeviceCall>>,
    failing_crtcs: Mutex<HashSet<crtc::Handle>>,
    plane_updates_fail: AtomicBool,
    tx: Mutex<Sender<MockEvent>>,
    rx: Mutex<Receiver<MockEvent>>,
}

impl MockDevice {
    pub(crate) fn new() -> Arc<Self> {
        let (tx, rx) = channel();
        Arc::new(MockDevice {
            calls: Mutex::new(Vec::new()),
            failing_crtcs: Mutex::new(HashSet::new()),
            plane_updates_fail: AtomicBool::new(false),
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        })
    }

    pub(crate) fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Makes every call targeting `crtc` fail with `EINVAL`.
    pub(crate) fn fail_crtc(&self, crtc: crtc::Handle) {
        self.failing_crtcs.lock().unwrap().insert(crtc);
    }

    pub(crate) fn pass_crtc(&self, crtc: crtc::Handle) {
        self.failing_crtcs.lock().unwrap().remove(&crtc);
    }

    pub(crate) fn fail_plane_updates(&self, fail: bool) {
        self.plane_updates_fail.store(fail, Ordering::SeqCst);
    }

    /// Queues a completion event for the dispatcher.
    pub(crate) fn deliver(&self, token: EventToken, sequence: u32) {
        self.tx
            .lock()
            .unwrap()
            .send(MockEvent::Completion(CompletionEvent {
                token,
                sequence,
                time: Duration::from_millis(16),
            }))
            .unwrap();
    }

    fn check_crtc(&self, crtc: crtc::Handle) -> io::Result<()> {
        if self.failing_crtcs.lock().unwrap().contains(&crtc) {
            return Err(io::Error::from_raw_os_error(22));
        }
        Ok(())
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ScanoutDevice for MockDevice {
    fn set_crtc(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        _src_pos: (i32, i32),
        connector: connector::Handle,
        _mode: &OutputMode,
    ) -> io::Result<()> {
        self.check_crtc(crtc)?;
        self.record(DeviceCall::SetCrtc { crtc, fb, connector });
        Ok(())
    }

    fn page_flip(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        flags: PageFlipFlags,
        token: Option<EventToken>,
    ) -> io::Result<()> {
        self.check_crtc(crtc)?;
        self.record(DeviceCall::PageFlip {
            crtc,
            fb,
            flags,
            token,
        });
        Ok(())
    }

    fn set_plane(
        &self,
        plane: plane::Handle,
        crtc: crtc::Handle,
        fb: Option<framebuffer::Handle>,
        dst: Rect,
        src: Rect,
    ) -> io::Result<()> {
        if self.plane_updates_fail.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(22));
        }
        self.record(DeviceCall::SetPlane {
            plane,
            crtc,
            fb,
            dst,
            src,
        });
        Ok(())
    }

    fn set_plane_property(
        &self,
        plane: plane::Handle,
        prop: property::Handle,
        value: property::RawValue,
    ) -> io::Result<()> {
        self.record(DeviceCall::SetPlaneProperty { plane, prop, value });
        Ok(())
    }

    fn request_vblank(&self, crtc: crtc::Handle, token: EventToken) -> io::Result<()> {
        self.check_crtc(crtc)?;
        self.record(DeviceCall::RequestVblank { crtc, token });
        Ok(())
    }

    fn receive_events(&self) -> io::Result<Vec<CompletionEvent>> {
        let rx = self.rx.lock().unwrap();
        match rx.recv() {
            Ok(MockEvent::Completion(event)) => {
                let mut events = vec![event];
                while let Ok(MockEvent::Completion(event)) = rx.try_recv() {
                    events.push(event);
                }
                Ok(events)
            }
            Ok(MockEvent::Wake) => Ok(Vec::new()),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock event source closed",
            )),
        }
    }

    fn wake(&self) -> io::Result<()> {
        self.tx
            .lock()
            .unwrap()
            .send(MockEvent::Wake)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock event source closed"))
    }

    fn dev_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/dev/dri/mock"))
    }
}

/// A frame source accounting for display notifications and buffer-chain
/// advances.
pub(crate) struct TestFrame {
    fb: framebuffer::Handle,
    displayed: Mutex<Vec<usize>>,
    advanced: AtomicUsize,
}

impl TestFrame {
    pub(crate) fn new(fb: framebuffer::Handle) -> Arc<Self> {
        Arc::new(TestFrame {
            fb,
            displayed: Mutex::new(Vec::new()),
            advanced: AtomicUsize::new(0),
        })
    }

    /// Buffer indices announced as visible, in order.
    pub(crate) fn displayed(&self) -> Vec<usize> {
        self.displayed.lock().unwrap().clone()
    }

    pub(crate) fn advanced(&self) -> usize {
        self.advanced.load(Ordering::SeqCst)
    }
}

impl FrameSource for TestFrame {
    fn framebuffer(&self, _buffer_index: usize) -> framebuffer::Handle {
        self.fb
    }

    fn on_displayed(&self, buffer_index: usize) {
        self.displayed.lock().unwrap().push(buffer_index);
    }

    fn advance(&self) {
        self.advanced.fetch_add(1, Ordering::SeqCst);
    }
}
