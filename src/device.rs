//! The hardware seam.
//!
//! [`ScanoutDevice`] is the engine's only route to the display hardware. It
//! covers the five calls the engine issues (modeset, page flip, plane
//! update, property write, vblank-event request) plus the blocking event
//! source the dispatcher drains. Errors cross the seam as raw
//! [`io::Error`] platform codes; the engine translates them into its own
//! [`Error`](crate::Error) taxonomy.
//!
//! Implementations over a real DRM node are expected to multiplex a wake-up
//! primitive (an eventfd or pipe) next to the device fd so that
//! [`wake`](ScanoutDevice::wake) can interrupt a blocked
//! [`receive_events`](ScanoutDevice::receive_events).

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use drm::control::{connector, crtc, framebuffer, plane, property};

use crate::output::{OutputMode, Rect};

bitflags::bitflags! {
    /// Flags for [`ScanoutDevice::page_flip`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlipFlags: u32 {
        /// Request a completion event carrying the submission's token.
        const EVENT = 1 << 0;
        /// Flip immediately, not synchronized to the vertical blank.
        const ASYNC = 1 << 1;
    }
}

/// Correlation token carried by a tracked submission and echoed back in its
/// [`CompletionEvent`].
///
/// Tokens are stable slot indices into the [`FlipRegistry`](crate::FlipRegistry),
/// not addresses; the dispatcher resolves them with a bounds-checked lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken(u32);

impl EventToken {
    pub(crate) fn new(slot: usize) -> Self {
        EventToken(slot as u32)
    }

    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }

    /// The raw value, as it crosses the hardware boundary.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A vblank or page-flip completion delivered by the event source.
#[derive(Debug, Clone, Copy)]
pub struct CompletionEvent {
    /// Token supplied with the originating submission
    pub token: EventToken,
    /// Hardware frame sequence number
    pub sequence: u32,
    /// Timestamp of the completion, relative to the platform's event clock
    pub time: Duration,
}

/// An open display device that can scan out frame buffers.
///
/// All operations must be callable from any thread; `receive_events` is only
/// ever called from the single dispatcher thread.
pub trait ScanoutDevice: Send + Sync {
    /// Full modeset of a primary target: scan out `fb` on `crtc` driving
    /// `connector` with `mode`, reading from `src_pos` within the buffer.
    fn set_crtc(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        src_pos: (i32, i32),
        connector: connector::Handle,
        mode: &OutputMode,
    ) -> io::Result<()>;

    /// Queue a buffer swap on `crtc` to take effect at the next vertical
    /// blank.
    ///
    /// With [`PageFlipFlags::EVENT`] the hardware will deliver a
    /// [`CompletionEvent`] carrying `token` once the flip took effect.
    fn page_flip(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        flags: PageFlipFlags,
        token: Option<EventToken>,
    ) -> io::Result<()>;

    /// Update an overlay plane: scan out `fb` over `crtc`, placing `src`
    /// (16.16 fixed point, buffer space) into `dst` (pixels, screen space).
    ///
    /// `fb: None` disables the plane; the rectangles are ignored then.
    fn set_plane(
        &self,
        plane: plane::Handle,
        crtc: crtc::Handle,
        fb: Option<framebuffer::Handle>,
        dst: Rect,
        src: Rect,
    ) -> io::Result<()>;

    /// Write a plane property (color key, z-order, alpha).
    fn set_plane_property(
        &self,
        plane: plane::Handle,
        prop: property::Handle,
        value: property::RawValue,
    ) -> io::Result<()>;

    /// Request a single [`CompletionEvent`] carrying `token` at the next
    /// vertical blank of `crtc`.
    ///
    /// This is the tracking path for plane updates, which unlike
    /// [`page_flip`](Self::page_flip) have no completion event of their own.
    fn request_vblank(&self, crtc: crtc::Handle, token: EventToken) -> io::Result<()>;

    /// Block until at least one completion event was delivered and return
    /// the batch.
    ///
    /// May return an empty batch after a [`wake`](Self::wake).
    fn receive_events(&self) -> io::Result<Vec<CompletionEvent>>;

    /// Unblock a pending [`receive_events`](Self::receive_events) call.
    fn wake(&self) -> io::Result<()>;

    /// Path of the underlying device node, for error reports.
    fn dev_path(&self) -> Option<PathBuf> {
        None
    }
}
