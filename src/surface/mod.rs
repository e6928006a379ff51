//! Scan-out surfaces: the submission side of the engine.
//!
//! Two kinds of surface share the same flip discipline:
//!
//! - [`PrimarySurface`] is bound 1:1 to a crtc and full-screen scans out the
//!   submitted frames, optionally replicated to a mirror group.
//! - [`OverlaySurface`] is an overlay plane composited at a level onto one
//!   crtc, with color-key, opacity and z-order control where the hardware
//!   exposes the properties.
//!
//! Submissions on one surface are serialized: a second `submit` waits
//! (bounded) until the previous flip's completion event was observed.
//! Submissions on different surfaces are fully independent.

mod plane;
mod primary;

pub use plane::OverlaySurface;
pub use primary::PrimarySurface;

bitflags::bitflags! {
    /// Flags of a [`PrimarySurface::submit`]/[`OverlaySurface::submit`] call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SubmitFlags: u32 {
        /// Block (bounded) until the submission's completion event was
        /// observed. A timed-out wait is logged, not an error; the hardware
        /// already accepted the frame.
        const WAIT_FOR_SYNC = 1 << 0;
        /// Advance the frame source's buffer chain after the submission was
        /// queued.
        const ADVANCE = 1 << 1;
    }
}
