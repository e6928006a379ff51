//! The frame-buffer resource seam.
//!
//! A [`FrameSource`] is whatever produces ready-to-scan-out frames: a
//! swapchain, a double-buffered surface, a single dumb buffer. The engine
//! holds a strong reference (`Arc`) to the source for every submission that
//! is in flight and drops it when the completion event for that submission
//! has been observed, so the producing side may rely on reference counting
//! for buffer reuse decisions.

use drm::control::framebuffer;

/// A reference-counted source of scan-out frame buffers.
///
/// A source may be multi-buffered; every operation takes the opaque
/// `buffer_index` identifying which buffer of the chain is meant.
pub trait FrameSource: Send + Sync {
    /// The scan-out handle of the given buffer in the chain.
    fn framebuffer(&self, buffer_index: usize) -> framebuffer::Handle;

    /// Notification that the given buffer is now visible on an output.
    ///
    /// Invoked exactly once per completed submission, on the event
    /// dispatcher thread and with the flip lock held. Implementations must
    /// return quickly and must not submit new frames from here.
    fn on_displayed(&self, buffer_index: usize);

    /// Advance the producing buffer chain after a submission was queued.
    ///
    /// Invoked from [`submit`](crate::PrimarySurface::submit) when
    /// [`SubmitFlags::ADVANCE`](crate::SubmitFlags::ADVANCE) is set. Sources
    /// without a buffer chain can leave the default no-op.
    fn advance(&self) {}
}
